//! Stack-scoped call frames for remote method invocations
//!
//! A [`CallFrame`] holds the marshaled argument bytes of one call, one typed
//! slot per argument, and a return slot tagged with the type the caller
//! expects back. Frames are acquired from a thread-local buffer pool and handed
//! back on `Drop`, so the buffer is released on every exit path including
//! early returns through `?`.
//!
//! A frame is counted against the pool and statistics of the thread that
//! acquired it, so `CallFrame` is neither `Send` nor `Sync`: it must be
//! dropped on the thread it came from.

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::BindingError;
use crate::handle::RawObject;
use crate::marshal::{DecodeError, Marshal, VariantType};

/// Number of released frame buffers each thread keeps for reuse by default
pub const DEFAULT_FRAME_POOL_LIMIT: usize = 16;

const INITIAL_ARG_CAPACITY: usize = 64;
const INITIAL_RET_CAPACITY: usize = 16;

static POOL_LIMIT: AtomicUsize = AtomicUsize::new(DEFAULT_FRAME_POOL_LIMIT);

#[derive(Debug, Default)]
struct Buffers {
    args: Vec<u8>,
    slots: Vec<Slot>,
    ret: Vec<u8>,
}

thread_local! {
    static POOL: RefCell<Vec<Buffers>> = const { RefCell::new(Vec::new()) };
    static STATS: Cell<FrameStats> = const { Cell::new(FrameStats { acquired: 0, released: 0 }) };
}

/// Per-thread frame accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    /// Frames acquired on this thread
    pub acquired: u64,
    /// Frames released on this thread
    pub released: u64,
}

impl FrameStats {
    /// Frames acquired but not yet released
    pub fn outstanding(&self) -> u64 {
        self.acquired.saturating_sub(self.released)
    }
}

/// Frame statistics for the calling thread
pub fn frame_stats() -> FrameStats {
    STATS.with(|s| s.get())
}

/// Set how many released buffers each thread keeps for reuse
pub fn set_frame_pool_limit(limit: usize) {
    POOL_LIMIT.store(limit, Ordering::Relaxed);
}

pub fn frame_pool_limit() -> usize {
    POOL_LIMIT.load(Ordering::Relaxed)
}

/// Number of idle buffers pooled on the calling thread
pub fn pooled_frames() -> usize {
    POOL.with(|p| p.borrow().len())
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    ty: VariantType,
    start: usize,
    end: usize,
}

/// Marshaled arguments and return slot of one invocation
#[derive(Debug)]
pub struct CallFrame {
    args: Vec<u8>,
    slots: Vec<Slot>,
    ret: Vec<u8>,
    ret_type: VariantType,
    ret_written: bool,
    // Pins the frame to its acquiring thread.
    _thread: PhantomData<*const ()>,
}

impl CallFrame {
    /// Acquire a frame whose return slot holds a `ret_type` value
    pub fn acquire(ret_type: VariantType) -> Self {
        let buffers = POOL
            .with(|p| p.borrow_mut().pop())
            .unwrap_or_else(|| Buffers {
                args: Vec::with_capacity(INITIAL_ARG_CAPACITY),
                slots: Vec::with_capacity(4),
                ret: Vec::with_capacity(INITIAL_RET_CAPACITY),
            });
        STATS.with(|s| {
            let mut stats = s.get();
            stats.acquired += 1;
            s.set(stats);
        });
        Self {
            args: buffers.args,
            slots: buffers.slots,
            ret: buffers.ret,
            ret_type,
            ret_written: false,
            _thread: PhantomData,
        }
    }

    /// Acquire a frame whose return slot matches `R`
    pub fn returning<R: Marshal>() -> Self {
        Self::acquire(R::TYPE)
    }

    /// Marshal one more argument onto the end of the frame
    ///
    /// A value that fails to encode leaves the frame unchanged.
    pub fn push_arg<T: Marshal>(&mut self, value: &T) -> Result<(), BindingError> {
        let start = self.args.len();
        if let Err(e) = value.encode(&mut self.args) {
            self.args.truncate(start);
            return Err(e.into());
        }
        self.slots.push(Slot {
            ty: T::TYPE,
            start,
            end: self.args.len(),
        });
        Ok(())
    }

    pub fn arg_count(&self) -> usize {
        self.slots.len()
    }

    /// Slot types in declaration order
    pub fn arg_types(&self) -> Vec<VariantType> {
        self.slots.iter().map(|s| s.ty).collect()
    }

    /// Type tag and bytes of argument `index`
    pub fn arg_bytes(&self, index: usize) -> Option<(VariantType, &[u8])> {
        self.slots
            .get(index)
            .map(|s| (s.ty, &self.args[s.start..s.end]))
    }

    /// Decode argument `index` as `T`
    pub fn arg<T: Marshal>(&self, index: usize) -> Result<T, BindingError> {
        let (ty, bytes) = self.arg_bytes(index).ok_or(DecodeError::ArgumentCount {
            expected: index + 1,
            actual: self.slots.len(),
        })?;
        if ty != T::TYPE {
            return Err(DecodeError::TypeMismatch {
                expected: T::TYPE,
                actual: ty,
            }
            .into());
        }
        Ok(T::decode(bytes)?)
    }

    /// Fail unless the frame holds exactly `count` arguments
    pub fn expect_arity(&self, count: usize) -> Result<(), BindingError> {
        if self.slots.len() != count {
            return Err(DecodeError::ArgumentCount {
                expected: count,
                actual: self.slots.len(),
            }
            .into());
        }
        Ok(())
    }

    /// Non-null object references passed as arguments
    pub fn object_args(&self) -> Vec<RawObject> {
        (0..self.slots.len())
            .filter_map(|i| match self.arg_bytes(i) {
                Some((VariantType::Object, bytes)) => RawObject::decode(bytes).ok(),
                _ => None,
            })
            .filter(|raw| !raw.is_null())
            .collect()
    }

    pub fn return_type(&self) -> VariantType {
        self.ret_type
    }

    pub fn has_return(&self) -> bool {
        self.ret_written
    }

    /// Write the return value; its type must match the reserved slot
    pub fn set_return<T: Marshal>(&mut self, value: &T) -> Result<(), BindingError> {
        if T::TYPE != self.ret_type {
            return Err(DecodeError::TypeMismatch {
                expected: self.ret_type,
                actual: T::TYPE,
            }
            .into());
        }
        self.ret.clear();
        if let Err(e) = value.encode(&mut self.ret) {
            self.ret.clear();
            return Err(e.into());
        }
        self.ret_written = true;
        Ok(())
    }

    /// Decode the return slot as `R`
    ///
    /// A `Nil` slot reads as `()` whether or not the callee wrote it.
    pub fn take_return<R: Marshal>(&self) -> Result<R, BindingError> {
        if R::TYPE != self.ret_type {
            return Err(DecodeError::TypeMismatch {
                expected: R::TYPE,
                actual: self.ret_type,
            }
            .into());
        }
        if !self.ret_written && self.ret_type != VariantType::Nil {
            return Err(DecodeError::MissingReturn.into());
        }
        Ok(R::decode(&self.ret)?)
    }
}

impl Drop for CallFrame {
    fn drop(&mut self) {
        let mut buffers = Buffers {
            args: std::mem::take(&mut self.args),
            slots: std::mem::take(&mut self.slots),
            ret: std::mem::take(&mut self.ret),
        };
        buffers.args.clear();
        buffers.slots.clear();
        buffers.ret.clear();

        let limit = frame_pool_limit();
        // Thread-local may already be gone during thread teardown.
        let _ = POOL.try_with(|p| {
            let mut pool = p.borrow_mut();
            if pool.len() < limit {
                pool.push(buffers);
            }
        });
        let _ = STATS.try_with(|s| {
            let mut stats = s.get();
            stats.released += 1;
            s.set(stats);
        });
    }
}

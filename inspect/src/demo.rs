//! A scripted extension class driven through the engine's virtual hooks
//!
//! `Player` extends `Node2D` from the host side. The engine never calls it
//! directly: each frame it asks the class database for `_process` by name,
//! the way a real main loop dispatches to scripts.

use gdbind_classes::{advance_frame, Camera2D, Engine, Node2D, Object};
use gdbind_core::{
    class_db, construct_as, frame_stats, invoke_virtual, native_class, register_class,
    BindingError, CallFrame, ClassBuilder, Inherits, LocalRuntime, NativeClass, RawObject,
    VariantType, Vector2,
};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

native_class! {
    /// Host-defined player character
    pub struct Player: Node2D, gdbind_classes::CanvasItem, gdbind_classes::Node, Object;
}

pub const PLAYER_CLASS: &str = "Player";

/// Where `_ready` places the player
pub const SPAWN: Vector2 = Vector2::new(16.0, 32.0);

/// Horizontal speed in units per second
pub const SPEED: f64 = 120.0;

/// Fixed timestep fed to `_process`
pub const DELTA: f64 = 1.0 / 60.0;

static PLAYER_REGISTERED: OnceCell<()> = OnceCell::new();

/// Register the `Player` extension class once
pub fn register_player() -> Result<(), BindingError> {
    PLAYER_REGISTERED
        .get_or_try_init(|| {
            register_class(
                ClassBuilder::extension(PLAYER_CLASS, Node2D::CLASS_NAME)
                    .virtual_fn("_ready", player_ready)
                    .virtual_fn("_process", player_process),
            )?;
            Ok(())
        })
        .map(|_| ())
}

fn player_ready(object: RawObject, _: ()) -> Result<(), BindingError> {
    // SAFETY: only registered on Player, which is a Node2D.
    let node = unsafe { Node2D::from_raw(object) };
    node.set_position(SPAWN)?;
    debug!(id = object.id(), "Player ready");
    Ok(())
}

fn player_process(object: RawObject, (delta,): (f64,)) -> Result<(), BindingError> {
    // SAFETY: only registered on Player, which is a Node2D.
    let node = unsafe { Node2D::from_raw(object) };
    node.translate(Vector2::new((SPEED * delta) as f32, 0.0))
}

/// Outcome of a demo run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemoReport {
    pub class: String,
    pub description: String,
    pub chain: Vec<String>,
    pub frames: u32,
    pub frames_drawn: i64,
    pub position: Vector2,
    pub child_count: i64,
    pub camera_current: bool,
    pub frames_outstanding: u64,
}

impl fmt::Display for DemoReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({})", self.description, self.chain.join(" -> "))?;
        writeln!(f, "  frames simulated: {}", self.frames)?;
        writeln!(f, "  engine frames drawn: {}", self.frames_drawn)?;
        writeln!(
            f,
            "  position: ({:.2}, {:.2})",
            self.position.x, self.position.y
        )?;
        writeln!(
            f,
            "  children: {} (camera current: {})",
            self.child_count, self.camera_current
        )?;
        write!(f, "  call frames outstanding: {}", self.frames_outstanding)
    }
}

/// Build a small scene around a `Player` and run it for `frames` frames
pub fn run_demo(rt: &LocalRuntime, frames: u32) -> Result<DemoReport, BindingError> {
    register_player()?;

    let player = construct_as::<Player>()?;
    player.set_name(PLAYER_CLASS)?;
    let camera = Camera2D::new()?;
    camera.make_current()?;
    player.add_child(camera)?;

    invoke_virtual(player.as_raw(), "_ready", &mut CallFrame::acquire(VariantType::Nil))?;

    let start_frames = Engine::singleton()?.get_frames_drawn()?;
    for _ in 0..frames {
        advance_frame(rt)?;
        let mut frame = CallFrame::acquire(VariantType::Nil);
        frame.push_arg(&DELTA)?;
        invoke_virtual(player.as_raw(), "_process", &mut frame)?;
    }

    let description: String = {
        let mut frame = CallFrame::returning::<String>();
        invoke_virtual(player.as_raw(), "_to_string", &mut frame)?;
        frame.take_return()?
    };

    let report = DemoReport {
        class: player.get_class()?,
        description,
        chain: player.class_chain()?,
        frames,
        frames_drawn: Engine::singleton()?.get_frames_drawn()? - start_frames,
        position: player.get_position()?,
        child_count: player.get_child_count()?,
        camera_current: camera.is_current()?,
        frames_outstanding: frame_stats().outstanding(),
    };

    Inherits::<Object>::upcast(camera).free()?;
    Inherits::<Object>::upcast(player).free()?;
    info!(frames, registered = class_db().len(), "Demo finished");
    Ok(report)
}

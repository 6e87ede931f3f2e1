//! Motor control: manual speeds, collision avoidance and path following.

mod collision;
mod controller;
mod motor;

pub use collision::{CollisionConfig, CollisionDetector};
pub use controller::{ControlConfig, ControlState, MotorController};
pub use motor::{DummyDriver, MotorDriver, MotorError, SharedDriver};

//! Motor driver abstraction.

use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MotorError {
    #[error("motor driver not connected")]
    NotConnected,
    #[error("speed out of range: {0}")]
    SpeedOutOfRange(f64),
    #[error("motor I/O error: {0}")]
    Io(String),
}

/// Abstraction over the motor hardware.
///
/// Implementations may be the serial driver itself or a layer above it
/// (easing, simulation). Speeds are references in `[-1, 1]` per wheel,
/// negative for reverse.
pub trait MotorDriver: Send {
    fn connect(&mut self) -> Result<(), MotorError>;
    fn disconnect(&mut self) -> Result<(), MotorError>;
    fn is_connected(&self) -> bool;
    fn set_speeds(&mut self, left: f64, right: f64) -> Result<(), MotorError>;
}

pub type SharedDriver = Arc<Mutex<dyn MotorDriver>>;

/// Driver that records the last commanded speeds. Stands in for hardware in
/// tests and simulation.
#[derive(Debug, Default)]
pub struct DummyDriver {
    connected: bool,
    last_speeds: (f64, f64),
}

impl DummyDriver {
    pub fn new() -> Self {
        Self {
            connected: true,
            last_speeds: (0.0, 0.0),
        }
    }

    pub fn last_speeds(&self) -> (f64, f64) {
        self.last_speeds
    }
}

impl MotorDriver for DummyDriver {
    fn connect(&mut self) -> Result<(), MotorError> {
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), MotorError> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn set_speeds(&mut self, left: f64, right: f64) -> Result<(), MotorError> {
        if !self.connected {
            return Err(MotorError::NotConnected);
        }
        for speed in [left, right] {
            if !(-1.0..=1.0).contains(&speed) {
                return Err(MotorError::SpeedOutOfRange(speed));
            }
        }
        self.last_speeds = (left, right);
        Ok(())
    }
}

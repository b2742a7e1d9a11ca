//! Host-facing protocol types: input events and stream configuration.

pub mod config;
pub mod input;

pub use config::{RemoteInputKeys, StreamConfiguration};
pub use input::{
    ControllerButtons, ControllerState, InputEvent, KeyAction, Modifiers, MouseButton,
    MouseButtonAction,
};

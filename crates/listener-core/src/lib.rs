//! Listener Core - transport and audio engine
//!
//! This crate provides the playlist, track discovery, the playback engine
//! contract with its symphonia/cpal implementation, and the transport state
//! machine that drives it.

pub mod command;
pub mod decoder;
pub mod engine;
pub mod library;
pub mod output;
pub mod player;
pub mod playlist;
pub mod transport;

pub use command::Command;
pub use engine::{ EngineError, EngineEvent, MediaLoadError, PlaybackEngine };
pub use library::LibraryError;
pub use player::AudioEngine;
pub use playlist::{ Playlist, Track };
pub use transport::{ PlaybackState, TransportController, TransportSnapshot };

//! Mock reader implementations for testing and development.
//!
//! This module provides a simulated reader and connector that can be
//! controlled programmatically without requiring physical hardware.

pub mod connector;
pub mod reader;

pub use connector::MockConnector;
pub use reader::{MockReader, MockReaderHandle, MockTag};

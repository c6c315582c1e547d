//! Testing utilities for forgeflow pipelines.
//!
//! This module provides:
//! - Fixtures for base-image templates and host projects
//! - Mock provisioners
//! - Assertions over reports, images, and event streams

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_event_emitted, assert_image_workdir_lists, assert_report_sealed,
};
pub use fixtures::{TestBases, TestHarness, TestProject};
pub use mocks::{FailingProvisioner, MockProvisioner};

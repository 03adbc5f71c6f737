//! # Taskshare Testkit
//!
//! Testing utilities for taskshare.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: A seeded store, manual clock, and recording notifier
//!   wired into a ready-to-use service
//! - **Generators**: Proptest strategies for emails, permissions, and ids
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use taskshare_testkit::fixtures::{acting, TestFixture, BOB, BOB_EMAIL};
//!
//! async fn example() {
//!     let fixture = TestFixture::seeded().await.unwrap();
//!     let token = fixture.invite(BOB_EMAIL, "view").await.unwrap();
//!     fixture.service.approve_share_request(&token, &acting(BOB)).await.unwrap();
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use taskshare_testkit::generators::{email, recased};
//!
//! proptest! {
//!     #[test]
//!     fn emails_normalize(typed in email().prop_flat_map(recased)) {
//!         prop_assert!(taskshare_core::validate_email(&typed).is_ok());
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{acting, RecordingNotifier, TestFixture};

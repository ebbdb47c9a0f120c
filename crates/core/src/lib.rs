//! Bulk SMS campaign composer.
//!
//! Pure domain logic for turning an imported contact list into a
//! dispatch-ready recipient set: segmentation and cost estimation, row
//! classification, the selection ledger with single-level undo, and the
//! campaign state machine that reconciles per-recipient send outcomes.
//!
//! Nothing in this crate performs I/O. Delivery goes through the
//! [`dispatch::DispatchGateway`] trait, implemented elsewhere.

pub mod campaign;
pub mod classifier;
pub mod contacts;
pub mod dispatch;
pub mod error;
pub mod ledger;
pub mod notice;
pub mod segmenter;
pub mod types;
pub mod undo;

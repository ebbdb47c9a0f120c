//! Background tasks.
//!
//! Each submodule spawns work via `tokio::spawn` and stops when its
//! [`CancellationToken`](tokio_util::sync::CancellationToken) fires.

pub mod notice_expiry;

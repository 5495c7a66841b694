//! Callback system for training events
//!
//! Provides extensible hooks for training loop events:
//! - `on_train_begin` / `on_train_end`
//! - `on_train_epoch_end`
//! - `on_validation_end`
//!
//! # Example
//!
//! ```rust
//! use afinar::train::callback::{CallbackAction, CallbackContext, TrainerCallback};
//!
//! struct PrintCallback;
//!
//! impl TrainerCallback for PrintCallback {
//!     fn on_train_epoch_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
//!         println!("Epoch {} finished at step {}", ctx.epoch, ctx.global_step);
//!         CallbackAction::Continue
//!     }
//! }
//! ```

mod checkpoint;
mod early_stopping;
mod manager;
mod monitor;
mod traits;

pub use checkpoint::ModelCheckpoint;
pub use early_stopping::EarlyStopping;
pub use manager::CallbackManager;
pub use monitor::{Monitor, MonitorMode};
pub use traits::{CallbackAction, CallbackContext, TrainerCallback};

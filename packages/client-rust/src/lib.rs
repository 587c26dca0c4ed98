//! Maestro Client — REST transport, shared grid state, and the master and
//! master-detail controllers built on `maestro-core`.

pub mod config;
pub mod error;
pub mod grid_state;
pub mod http;
pub mod master;
pub mod master_detail;
pub mod notify;
pub mod options;
pub mod traits;

pub use config::ClientConfig;
pub use error::{Action, ApiError, ControllerError, ErrorKind};
pub use grid_state::GridStateHandle;
pub use http::HttpApi;
pub use master::{MasterController, MasterPage};
pub use master_detail::MasterDetailController;
pub use notify::{
    report_failure, MemoryNavigator, MemoryNotifier, Notice, NoticeLevel, NoopNavigator,
    TracingNotifier,
};
pub use options::OptionResolver;
pub use traits::{Navigator, Notifier, QueryPairs, RestApi};

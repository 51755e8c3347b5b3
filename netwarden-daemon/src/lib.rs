//! netwarden-daemon 내부 모듈
//!
//! 바이너리([`main`](../src/main.rs))와 통합 테스트가 같은 모듈을
//! 공유할 수 있도록 라이브러리 타깃으로도 노출합니다.

pub mod access_log;
pub mod cli;
pub mod error;
pub mod logging;
pub mod metrics_server;

pub use access_log::{AccessLogSink, run_access_log};
pub use cli::DaemonCli;
pub use error::DaemonError;

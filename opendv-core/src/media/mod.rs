mod error;
pub mod extractor;
pub mod inspector;

use std::path::Path;
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::process::Command;

pub use error::{MediaError, MediaResult};
pub use extractor::{ExtractionOutcome, ExtractionRequest, FrameExtractor};
pub use inspector::{parse_probe_output, MediaInspector, MediaProbe};

/// Environment variable used to bind a transcoder process to one device.
pub const DEVICE_ENV: &str = "CUDA_VISIBLE_DEVICES";

/// Seam over external processes so probing and extraction can be faked in tests.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(
        &self,
        program: &Path,
        args: &[String],
        envs: &[(String, String)],
    ) -> std::io::Result<Output>;
}

#[derive(Debug, Default)]
pub struct SystemCommandExecutor;

#[async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn run(
        &self,
        program: &Path,
        args: &[String],
        envs: &[(String, String)],
    ) -> std::io::Result<Output> {
        let mut command = Command::new(program);
        command
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .args(args)
            .envs(envs.iter().map(|(key, value)| (key.as_str(), value.as_str())));
        command.output().await
    }
}

pub(crate) fn device_env(unit: Option<u32>) -> Vec<(String, String)> {
    unit.map(|unit| vec![(DEVICE_ENV.to_string(), unit.to_string())])
        .unwrap_or_default()
}

pub(crate) fn describe_command(program: &Path, args: &[String]) -> String {
    format!("{} {}", program.display(), args.join(" "))
}

//! Derivative job orchestration.
//!
//! [`DerivativeJob`] is deliberately thin: it inspects the source once,
//! stages a working image per directive, resolves the recipe, drives the
//! bounded executor, and hands the result to the storage collaborator.
//! Directives run sequentially; independent jobs for different sources may
//! run concurrently since nothing mutable is shared between them.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::command::{BoundedCommand, CommandRunner, ProcessRunner};
use crate::config::Config;
use crate::depth::estimate_bits_per_pixel;
use crate::directive::Directive;
use crate::image::{
    parse_geometry, ImageCrateInspector, ImageInspector, ImageProperties, TransformOptions,
};
use crate::recipe::build_recipe;
use crate::tools::resolve_encoder;
use crate::workspace::Workspace;
use crate::{Error, Result};

/// MIME type recorded for JPEG2000 derivatives.
pub const JP2_MIME_TYPE: &str = "image/jp2";

/// Storage collaborator holding source and derivative bytes.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Read the source file's bytes.
    async fn read_source(&self) -> Result<Vec<u8>>;

    /// Store one derivative under `name`.
    async fn write_derivative(&self, name: &str, bytes: Vec<u8>, mime_type: &str) -> Result<()>;
}

/// One directive's failure, retained so the job can report every outcome.
#[derive(Debug)]
pub struct DirectiveFailure {
    /// Name of the failed directive.
    pub directive: String,
    /// What went wrong.
    pub error: Error,
}

/// Outcome of a derivative job across all its directives.
#[derive(Debug, Default)]
pub struct JobReport {
    /// Output names of successfully written derivatives, in directive order.
    pub completed: Vec<String>,
    /// Every directive failure; a failed directive never blocks the rest.
    pub failures: Vec<DirectiveFailure>,
}

impl JobReport {
    /// Whether every directive completed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Orchestrates derivative generation for one source file.
///
/// The executor strategy, inspector backend, and timeout all arrive at
/// construction time; there is no ambient mutable configuration.
pub struct DerivativeJob<S> {
    store: S,
    config: Config,
    encoder: PathBuf,
    inspector: Arc<dyn ImageInspector>,
    runner: Arc<dyn CommandRunner>,
    cancellation: CancellationToken,
}

impl<S: SourceStore> DerivativeJob<S> {
    /// Create a job over `store` with the given configuration.
    ///
    /// Fails with [`Error::ToolNotFound`] when the encoder cannot be
    /// resolved.
    pub fn new(store: S, config: Config) -> Result<Self> {
        let encoder = resolve_encoder(&config.encoder)?;
        Ok(Self {
            store,
            config,
            encoder,
            inspector: Arc::new(ImageCrateInspector),
            runner: Arc::new(ProcessRunner),
            cancellation: CancellationToken::new(),
        })
    }

    /// Replace the inspection backend.
    pub fn with_inspector(mut self, inspector: Arc<dyn ImageInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    /// Replace the command runner (tests inject stub encoders here).
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// A token that aborts in-flight encoder invocations when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// The storage collaborator this job writes to.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Process the directives from configuration.
    pub async fn run(&self) -> Result<JobReport> {
        let directives = self.config.directives.clone();
        self.process(&directives).await
    }

    /// Process the given directives sequentially.
    ///
    /// The source is read and inspected once. A directive failure is
    /// isolated: its working files are removed, the failure is recorded,
    /// and the remaining directives still run. Only a failure to read or
    /// inspect the source aborts the whole job.
    pub async fn process(&self, directives: &[Directive]) -> Result<JobReport> {
        let source = self.store.read_source().await?;
        let props = self.inspector.inspect(&source)?;
        let bits_per_pixel = estimate_bits_per_pixel(&props);
        tracing::info!(
            width = props.width,
            height = props.height,
            colorspace = ?props.colorspace,
            bits_per_pixel,
            "source inspected"
        );

        let mut report = JobReport::default();
        for directive in directives {
            match self
                .process_directive(directive, &source, &props, bits_per_pixel)
                .await
            {
                Ok(output_name) => {
                    tracing::info!(directive = %directive.name, output = %output_name, "derivative written");
                    report.completed.push(output_name);
                }
                Err(error) => {
                    tracing::error!(directive = %directive.name, %error, "directive failed");
                    report.failures.push(DirectiveFailure {
                        directive: directive.name.clone(),
                        error,
                    });
                }
            }
        }

        Ok(report)
    }

    async fn process_directive(
        &self,
        directive: &Directive,
        source: &[u8],
        props: &ImageProperties,
        bits_per_pixel: u32,
    ) -> Result<String> {
        // Validated before anything is staged or spawned.
        let target_format = directive.require_target_format()?.to_string();

        let opts = TransformOptions {
            resize: directive
                .options
                .resize
                .as_deref()
                .map(parse_geometry)
                .transpose()?,
            to_srgb: directive.options.to_srgb,
        };
        let working = self.inspector.transform(source, props, &opts)?;

        let workspace = Workspace::new(self.config.encoder.temp_dir.as_deref())?;
        let input_path = workspace.working_file("source.tif");
        let output_path = workspace.working_file(&format!("derivative.{target_format}"));
        tokio::fs::write(&input_path, &working).await?;

        let recipe = build_recipe(
            directive,
            props.colorspace,
            props.long_dim(),
            props.byte_size,
            bits_per_pixel,
            &self.config.presets,
            self.config.encoder.num_threads,
        );
        tracing::debug!(directive = %directive.name, recipe = %recipe, "recipe resolved");

        let mut command = BoundedCommand::new(self.encoder.clone());
        command
            .arg("-i")
            .arg(input_path.to_string_lossy())
            .arg("-o")
            .arg(output_path.to_string_lossy())
            .args(recipe.args());
        if let Some(timeout) = self.config.encoder.timeout() {
            command.timeout(timeout);
        }

        // On failure the workspace drops here, taking the staged input and
        // any partial output with it before the error reaches the report.
        self.runner.run(command, &self.cancellation).await?;

        let bytes = tokio::fs::read(&output_path).await?;
        let output_name = directive.output_name().to_string();
        self.store
            .write_derivative(&output_name, bytes, JP2_MIME_TYPE)
            .await?;
        Ok(output_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOutput;
    use crate::directive::RecipeSource;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::Mutex;

    struct MemoryStore {
        source: Vec<u8>,
        derivatives: Mutex<HashMap<String, (Vec<u8>, String)>>,
    }

    impl MemoryStore {
        fn new(source: Vec<u8>) -> Self {
            Self {
                source,
                derivatives: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl SourceStore for MemoryStore {
        async fn read_source(&self) -> Result<Vec<u8>> {
            Ok(self.source.clone())
        }

        async fn write_derivative(
            &self,
            name: &str,
            bytes: Vec<u8>,
            mime_type: &str,
        ) -> Result<()> {
            self.derivatives
                .lock()
                .unwrap()
                .insert(name.to_string(), (bytes, mime_type.to_string()));
            Ok(())
        }
    }

    fn exit_status(code: i32) -> std::process::ExitStatus {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            std::process::ExitStatus::from_raw(code << 8)
        }
        #[cfg(not(unix))]
        {
            use std::os::windows::process::ExitStatusExt;
            std::process::ExitStatus::from_raw(code as u32)
        }
    }

    /// Copies the staged input to the output path, like an encoder that
    /// always succeeds; fails when the recipe contains `-fail`.
    struct StubEncoder {
        commands: Mutex<Vec<Vec<String>>>,
    }

    impl StubEncoder {
        fn new() -> Self {
            Self {
                commands: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CommandRunner for StubEncoder {
        async fn run(
            &self,
            command: BoundedCommand,
            _cancel: &CancellationToken,
        ) -> Result<CommandOutput> {
            let args = command.get_args().to_vec();
            self.commands.lock().unwrap().push(args.clone());

            if args.iter().any(|a| a == "-fail") {
                return Err(Error::ExitStatus {
                    command: command.command_line(),
                    status: exit_status(1),
                    stderr: "boom".into(),
                });
            }

            let input = args.iter().position(|a| a == "-i").map(|i| &args[i + 1]);
            let output = args.iter().position(|a| a == "-o").map(|i| &args[i + 1]);
            let (input, output) = (input.unwrap(), output.unwrap());
            std::fs::copy(input, output)?;

            Ok(CommandOutput {
                status: exit_status(0),
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    fn png_source() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(16, 16, image::Rgb([90u8, 120, 200]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn job_with_stub(
        store: MemoryStore,
        runner: Arc<StubEncoder>,
        config: Config,
    ) -> DerivativeJob<MemoryStore> {
        // Encoder resolution is bypassed by the stub runner; point the
        // configured path at something that exists.
        let mut config = config;
        config.encoder.kdu_compress_path = Some(std::env::temp_dir());
        DerivativeJob::new(store, config)
            .unwrap()
            .with_runner(runner)
    }

    #[tokio::test]
    async fn derivative_written_with_jp2_mime_type() {
        let store = MemoryStore::new(png_source());
        let runner = Arc::new(StubEncoder::new());
        let job = job_with_stub(store, runner.clone(), Config::default());

        let report = job.process(&[Directive::new("access", "jp2")]).await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.completed, vec!["access"]);

        let derivatives = job.store.derivatives.lock().unwrap();
        let (bytes, mime) = derivatives.get("access").unwrap();
        assert_eq!(mime, JP2_MIME_TYPE);
        // Stub copies the staged TIFF to the output.
        assert!(image::load_from_memory(bytes).is_ok());

        let commands = runner.commands.lock().unwrap();
        assert_eq!(commands.len(), 1);
        assert!(commands[0].iter().any(|a| a == "Corder=RPCL"));
        assert!(commands[0].iter().any(|a| a.ends_with("source.tif")));
        assert!(commands[0].iter().any(|a| a.ends_with("derivative.jp2")));
    }

    #[tokio::test]
    async fn missing_target_format_fails_before_encoding() {
        let store = MemoryStore::new(png_source());
        let runner = Arc::new(StubEncoder::new());
        let job = job_with_stub(store, runner.clone(), Config::default());

        let mut directive = Directive::new("bad", "jp2");
        directive.target_format = None;
        let report = job.process(&[directive]).await.unwrap();

        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0].error, Error::Config(_)));
        assert!(runner.commands.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_directive_does_not_block_the_rest() {
        let store = MemoryStore::new(png_source());
        let runner = Arc::new(StubEncoder::new());
        let job = job_with_stub(store, runner.clone(), Config::default());

        let mut failing = Directive::new("broken", "jp2");
        failing.options.recipe = Some(RecipeSource::Literal("-fail".into()));
        let ok = Directive::new("access", "jp2");

        let report = job.process(&[failing, ok]).await.unwrap();
        assert_eq!(report.completed, vec!["access"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].directive, "broken");
        match &report.failures[0].error {
            Error::ExitStatus { stderr, .. } => assert!(stderr.contains("boom")),
            other => panic!("expected ExitStatus, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn output_name_override_is_used() {
        let store = MemoryStore::new(png_source());
        let runner = Arc::new(StubEncoder::new());
        let job = job_with_stub(store, runner, Config::default());

        let mut directive = Directive::new("access", "jp2");
        directive.options.output_name = Some("access_hires".into());
        let report = job.process(&[directive]).await.unwrap();
        assert_eq!(report.completed, vec!["access_hires"]);
    }
}

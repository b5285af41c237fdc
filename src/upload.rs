//! Batched upload to the indexing service.
//!
//! Files are grouped into consecutive batches of at most `batch_size`, each
//! sent as one multipart request. `--force` selects PUT (replace the indexed
//! content for these files), otherwise PATCH (merge).
//!
//! # Failure handling
//!
//! A rejected batch is reported with its number, status, and body. Its
//! files are not recorded in the ledger, so they stay eligible next run.
//! Remaining batches are still attempted. Nothing is retried.
//!
//! Accepted batches are recorded immediately, so a crash mid-run does not
//! re-upload what was already sent.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::UploadConfig;
use crate::credentials::{EnvToken, TokenProvider};
use crate::error::{Result, SyncError};
use crate::ledger::Ledger;
use crate::models::{Batch, SyncSummary, TransportResponse, UploadCandidate, UploadMethod};
use crate::progress::{SyncEvent, SyncReporter};
use crate::transform::transform;

/// MIME type declared for a lower-cased extension (no leading dot).
pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "md" | "markdown" => "text/markdown",
        "org" => "text/org",
        _ => "text/plain",
    }
}

/// Lower-cased extension of `path` without the dot; empty when there is none.
pub fn extension_of(path: &str) -> String {
    Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

pub fn is_text_mime(mime: &str) -> bool {
    mime.starts_with("text/")
}

/// Read `path` and prepare it for upload.
///
/// Text types are decoded as UTF-8 and run through [`transform`]; everything
/// else is sent as raw bytes.
pub async fn build_candidate(path: &str) -> Result<UploadCandidate> {
    let mime_type = mime_for_extension(&extension_of(path));
    let raw = tokio::fs::read(path).await?;

    let content = if is_text_mime(mime_type) {
        let text = String::from_utf8(raw).map_err(|_| SyncError::Discovery {
            path: path.to_string(),
            message: "not valid UTF-8 text".to_string(),
        })?;
        transform(path, &text).into_bytes()
    } else {
        raw
    };

    Ok(UploadCandidate {
        path: path.to_string(),
        mime_type,
        content,
    })
}

/// Sends one batch to the indexing service.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Returns the service's response for any HTTP status; `Err` only when no
    /// response was received.
    async fn send(&self, method: UploadMethod, batch: &Batch) -> Result<TransportResponse>;
}

/// Multipart-over-HTTP transport backed by `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    field_name: String,
    tokens: Box<dyn TokenProvider>,
}

impl HttpTransport {
    pub fn new(config: &UploadConfig, tokens: Box<dyn TokenProvider>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            field_name: config.field_name.clone(),
            tokens,
        })
    }

    /// Transport whose token comes from `upload.token_env`.
    pub fn from_config(config: &UploadConfig) -> Result<Self> {
        Self::new(config, Box::new(EnvToken::new(config.token_env.clone())))
    }
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn send(&self, method: UploadMethod, batch: &Batch) -> Result<TransportResponse> {
        let mut form = Form::new();
        for candidate in &batch.candidates {
            let part = Part::bytes(candidate.content.clone())
                .file_name(candidate.path.clone())
                .mime_str(candidate.mime_type)?;
            form = form.part(self.field_name.clone(), part);
        }

        let request = match method {
            UploadMethod::Replace => self.client.put(&self.url),
            UploadMethod::Merge => self.client.patch(&self.url),
        };

        debug!(
            batch = batch.number,
            files = batch.len(),
            verb = method.http_verb(),
            "sending batch"
        );

        let response = request
            .bearer_auth(self.tokens.token())
            .multipart(form)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(TransportResponse { status, body })
    }
}

/// Batch size, pacing, and verb for one upload pass.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub batch_size: usize,
    /// Pause between consecutive batches. Not applied after the last one.
    pub batch_delay: Duration,
    pub method: UploadMethod,
}

impl UploadOptions {
    pub fn from_config(config: &UploadConfig, force_update: bool) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            batch_delay: Duration::from_secs(config.batch_delay_secs),
            method: UploadMethod::from_force(force_update),
        }
    }
}

pub struct Uploader<'a> {
    transport: &'a dyn UploadTransport,
    reporter: &'a dyn SyncReporter,
    options: UploadOptions,
}

impl<'a> Uploader<'a> {
    pub fn new(
        transport: &'a dyn UploadTransport,
        reporter: &'a dyn SyncReporter,
        options: UploadOptions,
    ) -> Self {
        Self {
            transport,
            reporter,
            options,
        }
    }

    /// Upload `files` batch by batch, recording accepted batches in `ledger`.
    ///
    /// Only a ledger write failure aborts; transport and read failures are
    /// reported and counted in the returned summary.
    pub async fn upload_all(&self, files: &[String], ledger: &mut Ledger) -> Result<SyncSummary> {
        let total = files.len();
        let batch_size = self.options.batch_size.max(1);
        let mut summary = SyncSummary {
            discovered: total,
            ..Default::default()
        };
        let mut processed = 0usize;

        for (idx, chunk) in files.chunks(batch_size).enumerate() {
            if idx > 0 && !self.options.batch_delay.is_zero() {
                tokio::time::sleep(self.options.batch_delay).await;
            }
            let number = idx + 1;

            let mut candidates = Vec::with_capacity(chunk.len());
            for path in chunk {
                match build_candidate(path).await {
                    Ok(candidate) => {
                        self.log(format!("Uploading: {}", path));
                        candidates.push(candidate);
                    }
                    Err(e) => {
                        warn!(path = %path, error = %e, "skipping unreadable file");
                        self.reporter
                            .report(SyncEvent::Error(format!("cannot read {}: {}", path, e)));
                        summary.failed += 1;
                    }
                }
            }
            processed += chunk.len();

            let batch = Batch { number, candidates };
            if !batch.is_empty() {
                self.send_batch(&batch, ledger, &mut summary).await?;
            }

            self.log(format!(
                "Progress: {}/{} files uploaded.",
                processed, total
            ));
            self.reporter.report(SyncEvent::progress(processed, total));
        }

        self.log("Upload completed.".to_string());
        info!(
            uploaded = summary.uploaded,
            failed = summary.failed,
            batches = summary.batches_sent,
            "upload finished"
        );
        Ok(summary)
    }

    async fn send_batch(
        &self,
        batch: &Batch,
        ledger: &mut Ledger,
        summary: &mut SyncSummary,
    ) -> Result<()> {
        summary.batches_sent += 1;

        let failure = match self.transport.send(self.options.method, batch).await {
            Ok(response) if response.is_success() => {
                self.log(format!("Uploaded batch {} successfully!", batch.number));
                ledger.record(&batch.paths())?;
                summary.uploaded += batch.len();
                return Ok(());
            }
            Ok(response) => SyncError::Transport {
                batch: batch.number,
                status: response.status,
                body: response.body,
            }
            .to_string(),
            Err(e) => format!("batch {} was not delivered: {}", batch.number, e),
        };

        warn!(batch = batch.number, "{}", failure);
        self.reporter.report(SyncEvent::Error(failure));
        summary.batches_failed += 1;
        summary.failed += batch.len();
        Ok(())
    }

    fn log(&self, message: String) {
        self.reporter.report(SyncEvent::Log(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::MemoryReporter;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// What the fake service saw for one request.
    #[derive(Debug, Clone)]
    struct Seen {
        method: UploadMethod,
        paths: Vec<String>,
        mimes: Vec<&'static str>,
        bodies: Vec<Vec<u8>>,
    }

    #[derive(Default)]
    struct FakeTransport {
        seen: Mutex<Vec<Seen>>,
        fail_batches: HashSet<usize>,
        unreachable: bool,
    }

    #[async_trait]
    impl UploadTransport for FakeTransport {
        async fn send(&self, method: UploadMethod, batch: &Batch) -> Result<TransportResponse> {
            self.seen.lock().unwrap().push(Seen {
                method,
                paths: batch.paths(),
                mimes: batch.candidates.iter().map(|c| c.mime_type).collect(),
                bodies: batch.candidates.iter().map(|c| c.content.clone()).collect(),
            });
            if self.unreachable {
                return Err(SyncError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )));
            }
            if self.fail_batches.contains(&batch.number) {
                return Ok(TransportResponse {
                    status: 500,
                    body: "index busy".to_string(),
                });
            }
            Ok(TransportResponse {
                status: 200,
                body: String::new(),
            })
        }
    }

    fn options(method: UploadMethod) -> UploadOptions {
        UploadOptions {
            batch_size: 10,
            batch_delay: Duration::ZERO,
            method,
        }
    }

    fn make_files(tmp: &TempDir, n: usize) -> Vec<String> {
        (0..n)
            .map(|i| {
                let p = tmp.path().join(format!("note-{:02}.md", i));
                std::fs::write(&p, format!("note {}", i)).unwrap();
                p.to_string_lossy().replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn mime_table() {
        assert_eq!(mime_for_extension(&extension_of("report.PDF")), "application/pdf");
        assert_eq!(mime_for_extension(&extension_of("notes.MD")), "text/markdown");
        assert_eq!(mime_for_extension(&extension_of("data.unknown")), "text/plain");
        assert_eq!(mime_for_extension(&extension_of("a/photo.JPEG")), "image/jpeg");
        assert_eq!(mime_for_extension(&extension_of("a/todo.org")), "text/org");
        assert_eq!(mime_for_extension(&extension_of("README")), "text/plain");
        assert_eq!(extension_of("report.PDF"), "pdf");
    }

    #[tokio::test]
    async fn twenty_five_files_make_three_batches() {
        let tmp = TempDir::new().unwrap();
        let files = make_files(&tmp, 25);
        let mut ledger = Ledger::new(tmp.path().join("ledger.txt"));
        let transport = FakeTransport::default();
        let reporter = MemoryReporter::default();

        let summary = Uploader::new(&transport, &reporter, options(UploadMethod::Merge))
            .upload_all(&files, &mut ledger)
            .await
            .unwrap();

        let seen = transport.seen.lock().unwrap().clone();
        let sizes: Vec<usize> = seen.iter().map(|s| s.paths.len()).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        assert!(seen.iter().all(|s| s.method == UploadMethod::Merge));
        assert_eq!(summary.uploaded, 25);
        assert_eq!(summary.batches_sent, 3);
        assert_eq!(ledger.len(), 25);

        let percents = reporter.percents();
        assert_eq!(percents.len(), 3);
        assert!((percents[2] - 100.0).abs() < 1e-9);
        assert_eq!(reporter.logs().last().unwrap(), "Upload completed.");
    }

    #[tokio::test]
    async fn failed_batch_is_not_recorded() {
        let tmp = TempDir::new().unwrap();
        let files = make_files(&tmp, 25);
        let ledger_path = tmp.path().join("ledger.txt");
        let mut ledger = Ledger::new(&ledger_path);
        let transport = FakeTransport {
            fail_batches: HashSet::from([2]),
            ..Default::default()
        };
        let reporter = MemoryReporter::default();

        let summary = Uploader::new(&transport, &reporter, options(UploadMethod::Merge))
            .upload_all(&files, &mut ledger)
            .await
            .unwrap();

        assert_eq!(transport.seen.lock().unwrap().len(), 3);
        assert_eq!(summary.uploaded, 15);
        assert_eq!(summary.failed, 10);
        assert_eq!(summary.batches_failed, 1);

        let reloaded = Ledger::load(&ledger_path).unwrap();
        for (i, path) in files.iter().enumerate() {
            let recorded = reloaded.recorded_mtime(path).is_some();
            assert_eq!(recorded, !(10..20).contains(&i), "file {} ({})", i, path);
        }

        let errors = reporter.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("batch 2"));
        assert!(errors[0].contains("500"));
        assert!(errors[0].contains("index busy"));
    }

    #[tokio::test]
    async fn unreachable_service_records_nothing() {
        let tmp = TempDir::new().unwrap();
        let files = make_files(&tmp, 3);
        let mut ledger = Ledger::new(tmp.path().join("ledger.txt"));
        let transport = FakeTransport {
            unreachable: true,
            ..Default::default()
        };
        let reporter = MemoryReporter::default();

        let summary = Uploader::new(&transport, &reporter, options(UploadMethod::Merge))
            .upload_all(&files, &mut ledger)
            .await
            .unwrap();

        assert_eq!(summary.uploaded, 0);
        assert_eq!(summary.batches_failed, 1);
        assert!(ledger.is_empty());
        assert!(reporter.errors()[0].contains("not delivered"));
    }

    #[tokio::test]
    async fn force_update_uses_replace() {
        let tmp = TempDir::new().unwrap();
        let files = make_files(&tmp, 2);
        let mut ledger = Ledger::new(tmp.path().join("ledger.txt"));
        let transport = FakeTransport::default();
        let reporter = MemoryReporter::default();

        let opts = UploadOptions::from_config(
            &UploadConfig {
                batch_delay_secs: 0,
                ..Default::default()
            },
            true,
        );
        Uploader::new(&transport, &reporter, opts)
            .upload_all(&files, &mut ledger)
            .await
            .unwrap();

        let seen = transport.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, UploadMethod::Replace);
        assert_eq!(UploadMethod::Replace.http_verb(), "PUT");
    }

    #[tokio::test]
    async fn text_is_transformed_and_binary_is_not() {
        let tmp = TempDir::new().unwrap();
        let drawing = tmp.path().join("sketch.excalidraw.md");
        std::fs::write(&drawing, "# Drawing\n## Text Elements\nfoo ^abc12345\n## Other\n{}\n")
            .unwrap();
        let image = tmp.path().join("pic.png");
        std::fs::write(&image, [0x89u8, b'P', b'N', b'G', 0xff]).unwrap();
        let files = vec![
            drawing.to_string_lossy().into_owned(),
            image.to_string_lossy().into_owned(),
        ];

        let mut ledger = Ledger::new(tmp.path().join("ledger.txt"));
        let transport = FakeTransport::default();
        let reporter = MemoryReporter::default();
        Uploader::new(&transport, &reporter, options(UploadMethod::Merge))
            .upload_all(&files, &mut ledger)
            .await
            .unwrap();

        let seen = transport.seen.lock().unwrap().clone();
        assert_eq!(seen[0].mimes, vec!["text/markdown", "image/png"]);
        assert_eq!(seen[0].bodies[0], b"## Text Elements\nfoo".to_vec());
        assert_eq!(seen[0].bodies[1], vec![0x89u8, b'P', b'N', b'G', 0xff]);
    }

    #[tokio::test]
    async fn unreadable_file_is_dropped_from_its_batch() {
        let tmp = TempDir::new().unwrap();
        let mut files = make_files(&tmp, 2);
        let bad = tmp.path().join("latin1.md");
        std::fs::write(&bad, [0xe9u8, 0x74, 0xe9]).unwrap();
        files.insert(1, bad.to_string_lossy().into_owned());
        files.push(tmp.path().join("gone.md").to_string_lossy().into_owned());

        let mut ledger = Ledger::new(tmp.path().join("ledger.txt"));
        let transport = FakeTransport::default();
        let reporter = MemoryReporter::default();
        let summary = Uploader::new(&transport, &reporter, options(UploadMethod::Merge))
            .upload_all(&files, &mut ledger)
            .await
            .unwrap();

        let seen = transport.seen.lock().unwrap().clone();
        assert_eq!(seen[0].paths.len(), 2);
        assert_eq!(summary.uploaded, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(reporter.errors().len(), 2);
        assert_eq!(ledger.len(), 2);
    }

    #[tokio::test]
    async fn batch_with_no_readable_files_is_not_sent() {
        let tmp = TempDir::new().unwrap();
        let files = vec![
            tmp.path().join("gone-1.md").to_string_lossy().into_owned(),
            tmp.path().join("gone-2.md").to_string_lossy().into_owned(),
        ];

        let mut ledger = Ledger::new(tmp.path().join("ledger.txt"));
        let transport = FakeTransport::default();
        let reporter = MemoryReporter::default();
        let summary = Uploader::new(&transport, &reporter, options(UploadMethod::Merge))
            .upload_all(&files, &mut ledger)
            .await
            .unwrap();

        assert!(transport.seen.lock().unwrap().is_empty());
        assert_eq!(summary.batches_sent, 0);
        assert_eq!(summary.failed, 2);
        assert_eq!(reporter.percents().last().copied(), Some(100.0));
    }
}

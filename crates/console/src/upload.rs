use extguard_core::{PolicyError, UploadJudge, UploadRecord, UploadRequest};
use std::fmt::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// A file chosen for the upload test.
#[derive(Debug, Clone)]
pub struct FileSelection {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl FileSelection {
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { file_name, bytes })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultModal {
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Judged(UploadRecord),
    Failed(String),
    /// A previous submission has not finished yet.
    Busy,
}

/// Clears the submitting flag however the submission ends.
struct SubmitGuard<'a>(&'a AtomicBool);

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct ViewState {
    title: String,
    modal: Option<ResultModal>,
    recent: Vec<UploadRecord>,
}

/// Upload test page state: result modal plus the recent-uploads table.
///
/// Methods take `&self` so the view can be shared with whatever triggers
/// submissions; a submit that arrives while another is in flight is refused
/// with [`SubmitOutcome::Busy`].
pub struct UploadTestView {
    judge: Arc<dyn UploadJudge>,
    submitting: AtomicBool,
    state: Mutex<ViewState>,
}

impl UploadTestView {
    pub fn new(judge: Arc<dyn UploadJudge>) -> Self {
        Self {
            judge,
            submitting: AtomicBool::new(false),
            state: Mutex::new(ViewState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ViewState> {
        // A panic elsewhere cannot leave the view state half-updated.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_title(&self, title: &str) {
        self.state().title = title.to_string();
    }

    /// Refresh the table. On failure the table is emptied.
    pub async fn load_recent(&self) -> Result<(), PolicyError> {
        match self.judge.recent().await {
            Ok(recent) => {
                self.state().recent = recent;
                Ok(())
            }
            Err(e) => {
                warn!("Failed to load upload history: {}", e);
                self.state().recent.clear();
                Err(e)
            }
        }
    }

    pub async fn submit(&self, selection: Option<FileSelection>) -> SubmitOutcome {
        let Some(selection) = selection else {
            return self.fail("No file was selected.".to_string());
        };
        if self
            .submitting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Ignoring submit while another is in flight");
            return SubmitOutcome::Busy;
        }

        let request = UploadRequest {
            title: self.state().title.clone(),
            file_name: selection.file_name,
            bytes: selection.bytes,
        };
        let result = {
            let _guard = SubmitGuard(&self.submitting);
            self.judge.judge(&request).await
        };

        match result {
            Ok(record) => {
                let ext = display_extension(&record.extension);
                let modal = if record.allowed {
                    ResultModal {
                        title: "Upload succeeded".to_string(),
                        message: format!("This file is allowed (.{}).", ext),
                    }
                } else {
                    ResultModal {
                        title: "Blocked".to_string(),
                        message: format!("The extension (.{}) is forbidden by policy.", ext),
                    }
                };
                let mut state = self.state();
                state.modal = Some(modal);
                state.recent.insert(0, record.clone());
                SubmitOutcome::Judged(record)
            }
            Err(PolicyError::Network { .. }) => {
                self.fail("A network or server error occurred.".to_string())
            }
            Err(e) => self.fail(e.to_string()),
        }
    }

    /// Close the result modal and reload the table from the judge.
    pub async fn acknowledge(&self) -> Result<(), PolicyError> {
        self.state().modal = None;
        self.load_recent().await
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::SeqCst)
    }

    pub fn modal(&self) -> Option<ResultModal> {
        self.state().modal.clone()
    }

    pub fn recent(&self) -> Vec<UploadRecord> {
        self.state().recent.clone()
    }

    pub fn render(&self) -> String {
        let state = self.state();
        let mut out = String::new();
        if let Some(modal) = &state.modal {
            let _ = writeln!(out, "== {} ==\n{}\n", modal.title, modal.message);
        }
        out.push_str("Recent uploads\n");
        if state.recent.is_empty() {
            out.push_str("  (none)\n");
        }
        for record in &state.recent {
            let _ = writeln!(
                out,
                "  {:<32} {:<8} {:<8} {}",
                record.file_name,
                display_extension(&record.extension),
                if record.allowed { "allowed" } else { "blocked" },
                record.upload_time.format("%Y-%m-%d %H:%M")
            );
        }
        out
    }

    fn fail(&self, message: String) -> SubmitOutcome {
        self.state().modal = Some(ResultModal {
            title: "Upload failed".to_string(),
            message: message.clone(),
        });
        SubmitOutcome::Failed(message)
    }
}

fn display_extension(extension: &str) -> &str {
    if extension.is_empty() {
        "-"
    } else {
        extension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use extguard_core::config::PolicyConfig;
    use extguard_core::judge::LocalJudge;
    use extguard_core::PolicyStore;
    use extguard_persistence::{FilePolicyStore, MemoryHistory};

    fn selection(name: &str) -> Option<FileSelection> {
        Some(FileSelection {
            file_name: name.to_string(),
            bytes: b"content".to_vec(),
        })
    }

    async fn local_view(dir: &tempfile::TempDir) -> UploadTestView {
        let store: Arc<dyn PolicyStore> = Arc::new(FilePolicyStore::new(
            dir.path().join("policy.json"),
            "extension-policy",
            &PolicyConfig::default(),
        ));
        store.set_fixed_blocked("exe", true).await.unwrap();
        store.add_custom("php").await.unwrap();
        let judge = LocalJudge::new(store, Arc::new(MemoryHistory::new(10)), 10);
        UploadTestView::new(Arc::new(judge))
    }

    struct DownJudge;

    #[async_trait]
    impl UploadJudge for DownJudge {
        async fn judge(&self, _: &UploadRequest) -> Result<UploadRecord, PolicyError> {
            Err(PolicyError::network("connection refused"))
        }
        async fn recent(&self) -> Result<Vec<UploadRecord>, PolicyError> {
            Err(PolicyError::network("connection refused"))
        }
    }

    #[tokio::test]
    async fn missing_file_shows_failure_modal() {
        let dir = tempfile::tempdir().unwrap();
        let view = local_view(&dir).await;

        let outcome = view.submit(None).await;
        assert_eq!(outcome, SubmitOutcome::Failed("No file was selected.".into()));
        assert_eq!(view.modal().unwrap().title, "Upload failed");
        assert!(view.recent().is_empty());
    }

    #[tokio::test]
    async fn blocked_and_allowed_results_prepend_rows() {
        let dir = tempfile::tempdir().unwrap();
        let view = local_view(&dir).await;

        let SubmitOutcome::Judged(record) = view.submit(selection("installer.exe")).await else {
            panic!("expected a judgment");
        };
        assert!(!record.allowed);
        assert_eq!(view.modal().unwrap().title, "Blocked");
        assert!(view.modal().unwrap().message.contains(".exe"));

        view.submit(selection("readme")).await;
        assert_eq!(view.modal().unwrap().title, "Upload succeeded");
        assert!(view.modal().unwrap().message.contains("(.-)"));

        assert_eq!(view.recent()[0].file_name, "readme");
        assert_eq!(view.recent()[1].file_name, "installer.exe");
        assert!(!view.is_submitting());
    }

    #[tokio::test]
    async fn acknowledge_closes_modal_and_reloads_history() {
        let dir = tempfile::tempdir().unwrap();
        let view = local_view(&dir).await;
        view.submit(selection("shell.PHP")).await;

        view.acknowledge().await.unwrap();
        assert!(view.modal().is_none());
        assert_eq!(view.recent().len(), 1);
        assert_eq!(view.recent()[0].extension, "php");
        assert!(view.render().contains("blocked"));
    }

    #[tokio::test]
    async fn network_failure_reenables_submit_and_clears_table() {
        let view = UploadTestView::new(Arc::new(DownJudge));

        let outcome = view.submit(selection("a.txt")).await;
        assert_eq!(
            outcome,
            SubmitOutcome::Failed("A network or server error occurred.".into())
        );
        assert!(!view.is_submitting());

        assert!(view.acknowledge().await.is_err());
        assert!(view.recent().is_empty());
    }

    /// Holds every judgment until released.
    struct GatedJudge {
        gate: tokio::sync::Notify,
    }

    #[async_trait]
    impl UploadJudge for GatedJudge {
        async fn judge(&self, upload: &UploadRequest) -> Result<UploadRecord, PolicyError> {
            self.gate.notified().await;
            Ok(UploadRecord::new(
                &upload.file_name,
                extguard_core::Classification {
                    extension: "txt".into(),
                    allowed: true,
                },
            ))
        }
        async fn recent(&self) -> Result<Vec<UploadRecord>, PolicyError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn second_submit_while_in_flight_is_refused() {
        let judge = Arc::new(GatedJudge {
            gate: tokio::sync::Notify::new(),
        });
        let view = UploadTestView::new(judge.clone());

        let first = view.submit(selection("a.txt"));
        let second = async {
            assert!(view.is_submitting());
            let outcome = view.submit(selection("b.txt")).await;
            judge.gate.notify_one();
            outcome
        };
        let (first, second) = tokio::join!(first, second);

        assert_eq!(second, SubmitOutcome::Busy);
        assert!(matches!(first, SubmitOutcome::Judged(ref r) if r.file_name == "a.txt"));
        assert!(!view.is_submitting());
        assert_eq!(view.recent().len(), 1);
    }

    #[tokio::test]
    async fn reads_selection_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Report.PDF");
        std::fs::write(&path, b"%PDF-1.4").unwrap();

        let selection = FileSelection::from_path(&path).await.unwrap();
        assert_eq!(selection.file_name, "Report.PDF");
        assert_eq!(selection.bytes, b"%PDF-1.4");
    }
}

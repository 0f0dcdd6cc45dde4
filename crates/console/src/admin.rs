use extguard_core::types::FixedExtension;
use extguard_core::{validator, Policy, PolicyError, PolicyLimits, PolicyStore};
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedCheckbox {
    pub extension: String,
    pub checked: bool,
}

/// Lifecycle of a custom-extension chip while the store call is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipState {
    PendingAdd,
    Present,
    PendingRemove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chip {
    pub extension: String,
    pub state: ChipState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modal {
    pub title: String,
    pub message: String,
}

/// Admin page state: fixed checkboxes, custom chips and the messages shown
/// to the user.
///
/// Changes are applied optimistically and persisted per action; a store
/// failure reverts the affected item and leaves an error notice.
pub struct AdminView {
    store: Arc<dyn PolicyStore>,
    limits: PolicyLimits,
    fixed: Vec<FixedCheckbox>,
    chips: Vec<Chip>,
    notices: Vec<Notice>,
    modal: Option<Modal>,
}

impl AdminView {
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self {
            store,
            limits: PolicyLimits::default(),
            fixed: Vec::new(),
            chips: Vec::new(),
            notices: Vec::new(),
            modal: None,
        }
    }

    /// Initial render: read the whole policy from the store.
    pub async fn load(&mut self) -> Result<(), PolicyError> {
        let policy = match self.store.snapshot().await {
            Ok(policy) => policy,
            Err(e) => {
                self.error(format!("Failed to load policy: {}", e));
                return Err(e);
            }
        };

        self.limits = policy.limits;
        self.fixed = policy
            .fixed
            .into_iter()
            .map(|FixedExtension { extension, blocked }| FixedCheckbox {
                extension,
                checked: blocked,
            })
            .collect();
        self.chips = policy
            .custom
            .into_iter()
            .map(|extension| Chip {
                extension,
                state: ChipState::Present,
            })
            .collect();
        debug!(
            "Admin view loaded: {} fixed, {} custom",
            self.fixed.len(),
            self.chips.len()
        );
        Ok(())
    }

    pub async fn toggle_fixed(&mut self, extension: &str, checked: bool) -> Result<(), PolicyError> {
        let extension = validator::normalize(extension);
        let Some(idx) = self.fixed.iter().position(|f| f.extension == extension) else {
            let err = PolicyError::UnknownFixed { extension };
            self.error(err.to_string());
            return Err(err);
        };

        let previous = self.fixed[idx].checked;
        self.fixed[idx].checked = checked;

        if let Err(e) = self.store.set_fixed_blocked(&extension, checked).await {
            warn!("Toggle of {} failed, reverting: {}", extension, e);
            self.fixed[idx].checked = previous;
            self.error(e.to_string());
            return Err(e);
        }
        self.info(format!(
            ".{} is now {}",
            extension,
            if checked { "blocked" } else { "allowed" }
        ));
        Ok(())
    }

    /// Validate locally against the current view, then persist. A rejected
    /// extension never produces a chip.
    pub async fn add_custom(&mut self, input: &str) -> Result<String, PolicyError> {
        let extension = match validator::validate(input, &self.current_policy()) {
            Ok(extension) => extension,
            Err(e) => {
                self.error(e.to_string());
                return Err(e);
            }
        };

        self.chips.push(Chip {
            extension: extension.clone(),
            state: ChipState::PendingAdd,
        });

        match self.store.add_custom(&extension).await {
            Ok(stored) => {
                if let Some(chip) = self.find_chip_mut(&extension, ChipState::PendingAdd) {
                    chip.extension = stored.clone();
                    chip.state = ChipState::Present;
                }
                self.info(format!("Added .{}", stored));
                Ok(stored)
            }
            Err(e) => {
                self.chips
                    .retain(|c| !(c.extension == extension && c.state == ChipState::PendingAdd));
                self.error(e.to_string());
                Err(e)
            }
        }
    }

    /// Remove the chip identified by `extension`.
    pub async fn remove_custom(&mut self, extension: &str) -> Result<(), PolicyError> {
        let extension = validator::normalize(extension);
        let Some(chip) = self.find_chip_mut(&extension, ChipState::Present) else {
            let err = PolicyError::NotFound { extension };
            self.error(err.to_string());
            return Err(err);
        };
        chip.state = ChipState::PendingRemove;

        match self.store.remove_custom(&extension).await {
            Ok(()) => {
                self.chips
                    .retain(|c| !(c.extension == extension && c.state == ChipState::PendingRemove));
                self.info(format!("Removed .{}", extension));
                Ok(())
            }
            Err(e) => {
                if let Some(chip) = self.find_chip_mut(&extension, ChipState::PendingRemove) {
                    chip.state = ChipState::Present;
                }
                self.error(e.to_string());
                Err(e)
            }
        }
    }

    /// Every action is already persisted, so saving only confirms.
    pub fn save(&mut self) {
        self.modal = Some(Modal {
            title: "Saved".to_string(),
            message: "Extension policy changes have been applied.".to_string(),
        });
        self.info("Policy saved".to_string());
    }

    /// Discard view state and re-read it from the store.
    pub async fn cancel(&mut self) -> Result<(), PolicyError> {
        self.notices.clear();
        self.modal = None;
        self.load().await
    }

    pub fn dismiss_modal(&mut self) {
        self.modal = None;
    }

    /// Live counter: chips that exist in the store.
    pub fn custom_count(&self) -> usize {
        self.chips
            .iter()
            .filter(|c| c.state != ChipState::PendingAdd)
            .count()
    }

    pub fn limits(&self) -> PolicyLimits {
        self.limits
    }

    pub fn fixed(&self) -> &[FixedCheckbox] {
        &self.fixed
    }

    pub fn chips(&self) -> &[Chip] {
        &self.chips
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn modal(&self) -> Option<&Modal> {
        self.modal.as_ref()
    }

    pub fn render(&self) -> String {
        let mut out = String::from("Fixed extensions\n");
        for f in &self.fixed {
            let _ = writeln!(out, "  [{}] {}", if f.checked { "x" } else { " " }, f.extension);
        }
        let _ = writeln!(
            out,
            "Custom extensions ({}/{})",
            self.custom_count(),
            self.limits.max_custom_extensions
        );
        if self.chips.is_empty() {
            out.push_str("  (none)\n");
        } else {
            let names: Vec<&str> = self.chips.iter().map(|c| c.extension.as_str()).collect();
            let _ = writeln!(out, "  {}", names.join("  "));
        }
        if let Some(modal) = &self.modal {
            let _ = writeln!(out, "\n== {} ==\n{}", modal.title, modal.message);
        }
        out
    }

    fn current_policy(&self) -> Policy {
        Policy::new(
            self.fixed
                .iter()
                .map(|f| FixedExtension {
                    extension: f.extension.clone(),
                    blocked: f.checked,
                })
                .collect(),
            self.chips.iter().map(|c| c.extension.clone()).collect(),
            self.limits,
        )
    }

    fn find_chip_mut(&mut self, extension: &str, state: ChipState) -> Option<&mut Chip> {
        self.chips
            .iter_mut()
            .find(|c| c.extension == extension && c.state == state)
    }

    fn info(&mut self, message: String) {
        self.notices.push(Notice {
            kind: NoticeKind::Info,
            message,
        });
    }

    fn error(&mut self, message: String) {
        self.notices.push(Notice {
            kind: NoticeKind::Error,
            message,
        });
    }
}

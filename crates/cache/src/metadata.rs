use serde::{Deserialize, Serialize};

/// The compiler chosen by a previous probe, persisted under the cache root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainRecord {
    /// Compiler command without any ccache prefix, e.g. `g++`.
    pub compiler: String,
    /// Whether `ccache --version` succeeded when the record was made.
    pub ccache: bool,
    pub created_at: u64,
}

impl ToolchainRecord {
    pub fn new(compiler: impl Into<String>, ccache: bool) -> Self {
        Self {
            compiler: compiler.into(),
            ccache,
            created_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        }
    }

    /// Full compiler command words, ccache first when available.
    pub fn command_words(&self) -> Vec<String> {
        let mut words = Vec::new();
        if self.ccache {
            words.push("ccache".to_string());
        }
        words.push(self.compiler.clone());
        words
    }
}

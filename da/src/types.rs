use containers::Block;

/// Outcome of a data availability call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusCode {
    #[default]
    Success,
    /// The data exists but the backend has not finished processing it.
    NotYetAvailable,
    Error,
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Success => "success",
            StatusCode::NotYetAvailable => "not_yet_available",
            StatusCode::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BaseResult {
    pub code: StatusCode,
    pub message: String,
    /// Position assigned or reported by the backend.
    pub da_height: u64,
}

impl BaseResult {
    pub fn success(da_height: u64) -> Self {
        Self {
            code: StatusCode::Success,
            message: String::new(),
            da_height,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::Error,
            message: message.into(),
            da_height: 0,
        }
    }

    pub fn not_yet_available(da_height: u64, message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::NotYetAvailable,
            message: message.into(),
            da_height,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSubmitBlock {
    pub base: BaseResult,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultCheckBlock {
    pub base: BaseResult,
    /// False means "not yet", never "never".
    pub data_available: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultRetrieveBlocks {
    pub base: BaseResult,
    pub blocks: Vec<Block>,
}

impl From<BaseResult> for ResultSubmitBlock {
    fn from(base: BaseResult) -> Self {
        Self { base }
    }
}

impl From<BaseResult> for ResultCheckBlock {
    fn from(base: BaseResult) -> Self {
        Self {
            base,
            data_available: false,
        }
    }
}

impl From<BaseResult> for ResultRetrieveBlocks {
    fn from(base: BaseResult) -> Self {
        Self {
            base,
            blocks: Vec::new(),
        }
    }
}

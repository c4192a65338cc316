pub type PinResult<T> = Result<T, PinError>;

#[derive(thiserror::Error, Debug)]
pub enum PinError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("element render error: {0}")]
    ElementRender(String),

    #[error("row render error: {0}")]
    RowRender(String),

    #[error("font error: {0}")]
    Font(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PinError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn element(msg: impl Into<String>) -> Self {
        Self::ElementRender(msg.into())
    }

    pub fn row(msg: impl Into<String>) -> Self {
        Self::RowRender(msg.into())
    }

    pub fn font(msg: impl Into<String>) -> Self {
        Self::Font(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            PinError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            PinError::element("x")
                .to_string()
                .contains("element render error:")
        );
        assert!(PinError::row("x").to_string().contains("row render error:"));
        assert!(PinError::store("x").to_string().contains("store error:"));
        assert!(PinError::font("x").to_string().contains("font error:"));
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = PinError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}

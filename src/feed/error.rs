#[derive(thiserror::Error, Debug)]
pub enum FeedError {
    #[error("Init error: {0}")]
    Init(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Deserialize error: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("Protobuf decode error: {0}")]
    Protobuf(#[from] prost::DecodeError),
}

pub type FeedResult<T> = Result<T, FeedError>;

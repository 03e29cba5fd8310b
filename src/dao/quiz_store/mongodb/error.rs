use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use thiserror::Error;
use uuid::Uuid;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// MongoDB error code for unique index violations.
const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to save quiz `{id}`")]
    SaveQuiz {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load quiz `{id}`")]
    LoadQuiz {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to write session `{id}`")]
    SaveSession {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load session")]
    LoadSession {
        #[source]
        source: MongoError,
    },
    #[error("failed to write participant `{id}`")]
    SaveParticipant {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load participants")]
    LoadParticipants {
        #[source]
        source: MongoError,
    },
    #[error("failed to write response for participant `{participant_id}`")]
    SaveResponse {
        participant_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load responses for session `{session_id}`")]
    LoadResponses {
        session_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("stored document `{id}` is malformed: {reason}")]
    Malformed { id: String, reason: &'static str },
}

/// Whether the driver error is a unique index violation.
pub fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY_CODE
    )
}

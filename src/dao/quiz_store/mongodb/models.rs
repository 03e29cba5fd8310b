//! BSON document shapes. Identifiers are stored as hyphenated strings so filters
//! built with `doc!` match what serde wrote.

use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::MongoDaoError;
use crate::dao::models::{
    AnswerEntity, GameSessionEntity, ParticipantEntity, QuestionEntity, QuizEntity,
    ResponseEntity, SessionModeEntity, SessionStatusEntity, VisibilityEntity,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoQuizDocument {
    #[serde(rename = "_id")]
    id: String,
    title: String,
    description: Option<String>,
    visibility: VisibilityEntity,
    owner_id: String,
    created_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoQuestionDocument {
    #[serde(rename = "_id")]
    id: String,
    quiz_id: String,
    text: String,
    time_limit_secs: i64,
    points: i64,
    order_index: i64,
    answers: Vec<MongoAnswerDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoAnswerDocument {
    id: String,
    text: String,
    color: Option<String>,
    is_correct: bool,
    order_index: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    id: String,
    quiz_id: String,
    host_id: String,
    access_pin: String,
    /// Mirrors `access_pin` until the session finishes; carries the sparse unique index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    open_pin: Option<String>,
    mode: SessionModeEntity,
    status: SessionStatusEntity,
    total_time_minutes: Option<i64>,
    countdown_started_at: Option<DateTime>,
    started_at: Option<DateTime>,
    ended_at: Option<DateTime>,
    created_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoParticipantDocument {
    #[serde(rename = "_id")]
    id: String,
    session_id: String,
    user_id: Option<String>,
    nickname: String,
    score: i64,
    joined_at: DateTime,
    join_seq: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoResponseDocument {
    #[serde(rename = "_id")]
    id: String,
    session_id: String,
    participant_id: String,
    question_id: String,
    answer_id: Option<String>,
    response_time_ms: i64,
    created_at: DateTime,
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}

fn parse_uuid(raw: &str) -> Result<Uuid, MongoDaoError> {
    Uuid::parse_str(raw).map_err(|_| MongoDaoError::Malformed {
        id: raw.to_owned(),
        reason: "invalid uuid",
    })
}

fn to_u32(value: i64, id: &str) -> Result<u32, MongoDaoError> {
    u32::try_from(value).map_err(|_| MongoDaoError::Malformed {
        id: id.to_owned(),
        reason: "integer out of range",
    })
}

impl From<QuizEntity> for MongoQuizDocument {
    fn from(value: QuizEntity) -> Self {
        Self {
            id: value.id.to_string(),
            title: value.title,
            description: value.description,
            visibility: value.visibility,
            owner_id: value.owner_id.to_string(),
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoQuizDocument> for QuizEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoQuizDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&value.id)?,
            title: value.title,
            description: value.description,
            visibility: value.visibility,
            owner_id: parse_uuid(&value.owner_id)?,
            created_at: value.created_at.to_system_time(),
        })
    }
}

impl From<QuestionEntity> for MongoQuestionDocument {
    fn from(value: QuestionEntity) -> Self {
        Self {
            id: value.id.to_string(),
            quiz_id: value.quiz_id.to_string(),
            text: value.text,
            time_limit_secs: value.time_limit_secs.into(),
            points: value.points.into(),
            order_index: value.order_index.into(),
            answers: value
                .answers
                .into_iter()
                .map(|answer| MongoAnswerDocument {
                    id: answer.id.to_string(),
                    text: answer.text,
                    color: answer.color,
                    is_correct: answer.is_correct,
                    order_index: answer.order_index.into(),
                })
                .collect(),
        }
    }
}

impl TryFrom<MongoQuestionDocument> for QuestionEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoQuestionDocument) -> Result<Self, Self::Error> {
        let mut answers = value
            .answers
            .into_iter()
            .map(|answer| {
                Ok(AnswerEntity {
                    id: parse_uuid(&answer.id)?,
                    order_index: to_u32(answer.order_index, &answer.id)?,
                    text: answer.text,
                    color: answer.color,
                    is_correct: answer.is_correct,
                })
            })
            .collect::<Result<Vec<_>, MongoDaoError>>()?;
        answers.sort_by_key(|answer| answer.order_index);

        Ok(Self {
            id: parse_uuid(&value.id)?,
            quiz_id: parse_uuid(&value.quiz_id)?,
            time_limit_secs: to_u32(value.time_limit_secs, &value.id)?,
            points: to_u32(value.points, &value.id)?,
            order_index: to_u32(value.order_index, &value.id)?,
            text: value.text,
            answers,
        })
    }
}

impl From<GameSessionEntity> for MongoSessionDocument {
    fn from(value: GameSessionEntity) -> Self {
        let open_pin =
            (value.status != SessionStatusEntity::Finished).then(|| value.access_pin.clone());
        Self {
            id: value.id.to_string(),
            quiz_id: value.quiz_id.to_string(),
            host_id: value.host_id.to_string(),
            access_pin: value.access_pin,
            open_pin,
            mode: value.mode,
            status: value.status,
            total_time_minutes: value.total_time_minutes.map(Into::into),
            countdown_started_at: value.countdown_started_at.map(DateTime::from_system_time),
            started_at: value.started_at.map(DateTime::from_system_time),
            ended_at: value.ended_at.map(DateTime::from_system_time),
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoSessionDocument> for GameSessionEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoSessionDocument) -> Result<Self, Self::Error> {
        let total_time_minutes = value
            .total_time_minutes
            .map(|minutes| to_u32(minutes, &value.id))
            .transpose()?;
        Ok(Self {
            id: parse_uuid(&value.id)?,
            quiz_id: parse_uuid(&value.quiz_id)?,
            host_id: parse_uuid(&value.host_id)?,
            access_pin: value.access_pin,
            mode: value.mode,
            status: value.status,
            total_time_minutes,
            countdown_started_at: value.countdown_started_at.map(|at| at.to_system_time()),
            started_at: value.started_at.map(|at| at.to_system_time()),
            ended_at: value.ended_at.map(|at| at.to_system_time()),
            created_at: value.created_at.to_system_time(),
        })
    }
}

impl From<ParticipantEntity> for MongoParticipantDocument {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            id: value.id.to_string(),
            session_id: value.session_id.to_string(),
            user_id: value.user_id.map(|id| id.to_string()),
            nickname: value.nickname,
            score: value.score.into(),
            joined_at: DateTime::from_system_time(value.joined_at),
            join_seq: i64::try_from(value.join_seq).unwrap_or(i64::MAX),
        }
    }
}

impl TryFrom<MongoParticipantDocument> for ParticipantEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoParticipantDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&value.id)?,
            session_id: parse_uuid(&value.session_id)?,
            user_id: value.user_id.as_deref().map(parse_uuid).transpose()?,
            score: to_u32(value.score, &value.id)?,
            joined_at: value.joined_at.to_system_time(),
            join_seq: u64::try_from(value.join_seq).unwrap_or_default(),
            nickname: value.nickname,
        })
    }
}

impl From<ResponseEntity> for MongoResponseDocument {
    fn from(value: ResponseEntity) -> Self {
        Self {
            id: value.id.to_string(),
            session_id: value.session_id.to_string(),
            participant_id: value.participant_id.to_string(),
            question_id: value.question_id.to_string(),
            answer_id: value.answer_id.map(|id| id.to_string()),
            response_time_ms: i64::try_from(value.response_time_ms).unwrap_or(i64::MAX),
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoResponseDocument> for ResponseEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoResponseDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&value.id)?,
            session_id: parse_uuid(&value.session_id)?,
            participant_id: parse_uuid(&value.participant_id)?,
            question_id: parse_uuid(&value.question_id)?,
            answer_id: value.answer_id.as_deref().map(parse_uuid).transpose()?,
            response_time_ms: u64::try_from(value.response_time_ms).unwrap_or_default(),
            created_at: value.created_at.to_system_time(),
        })
    }
}

impl MongoResponseDocument {
    /// Filter selecting the single logical response of a participant for a question.
    pub fn natural_key(&self) -> Document {
        doc! {
            "participant_id": self.participant_id.clone(),
            "question_id": self.question_id.clone(),
        }
    }

    /// Update document replacing every mutable column while keeping the first `_id`.
    pub fn upsert_update(&self) -> Document {
        doc! {
            "$set": {
                "session_id": self.session_id.clone(),
                "answer_id": self.answer_id.clone(),
                "response_time_ms": self.response_time_ms,
                "created_at": self.created_at,
            },
            "$setOnInsert": { "_id": self.id.clone() },
        }
    }
}

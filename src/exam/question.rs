use crate::error::{ExamError, Result};
use serde::{Deserialize, Serialize};

/// One speaking task as served by the question catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    /// Exam part (2 = independent, 3 = integrated)
    pub part: u8,
    pub question_number: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    /// Prompt shown to the candidate
    #[serde(rename = "question")]
    pub prompt: String,
    pub preparation_time: u32,
    pub response_time: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading_time: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_file: Option<String>,
    /// Transcript of a campus conversation (integrated tasks)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<String>,
    /// Transcript of an academic lecture (integrated tasks)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lecture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tips: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_response: Option<String>,
}

/// What the Listening phase plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListeningKind {
    Conversation,
    Lecture,
}

impl Question {
    pub fn validate(&self) -> Result<()> {
        if self.preparation_time == 0 {
            return Err(ExamError::QuestionLoadError(format!(
                "question {} has no preparation time",
                self.id
            )));
        }
        if self.response_time == 0 {
            return Err(ExamError::QuestionLoadError(format!(
                "question {} has no response time",
                self.id
            )));
        }
        if !matches!(self.part, 2 | 3) {
            return Err(ExamError::QuestionLoadError(format!(
                "question {} has unsupported part {}",
                self.id, self.part
            )));
        }
        Ok(())
    }

    /// A non-empty reading passage
    pub fn reading_passage(&self) -> Option<&str> {
        self.reading.as_deref().filter(|r| !r.trim().is_empty())
    }

    /// A non-empty listening asset reference
    pub fn audio_asset(&self) -> Option<&str> {
        self.audio_file.as_deref().filter(|a| !a.trim().is_empty())
    }

    /// Reading time, falling back to `default_secs` when the catalog gives none
    pub fn reading_secs(&self, default_secs: u32) -> u32 {
        match self.reading_time {
            Some(secs) if secs > 0 => secs,
            _ => default_secs,
        }
    }

    pub fn listening_kind(&self) -> ListeningKind {
        if self.conversation.is_some() {
            ListeningKind::Conversation
        } else {
            ListeningKind::Lecture
        }
    }

    pub fn tips(&self) -> &[String] {
        self.tips.as_deref().unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTEGRATED: &str = r#"{
        "id": "q3-campus",
        "part": 3,
        "questionNumber": 2,
        "type": "Integrated Speaking",
        "title": "Campus Parking Policy",
        "question": "The woman expresses her opinion about the plan.",
        "preparationTime": 30,
        "responseTime": 60,
        "reading": "The university will close Lot B.",
        "readingTime": 50,
        "audioFile": "/static/audio/q3-campus.mp3",
        "conversation": "M: Did you see the notice?",
        "tips": ["Summarize the plan", "State her reasons"],
        "category": "Integrated",
        "difficulty": "medium"
    }"#;

    #[test]
    fn test_deserialize_catalog_record() {
        let q: Question = serde_json::from_str(INTEGRATED).unwrap();
        assert_eq!(q.id, "q3-campus");
        assert_eq!(q.kind, "Integrated Speaking");
        assert_eq!(q.prompt, "The woman expresses her opinion about the plan.");
        assert_eq!(q.reading_secs(45), 50);
        assert_eq!(q.audio_asset(), Some("/static/audio/q3-campus.mp3"));
        assert_eq!(q.listening_kind(), ListeningKind::Conversation);
        assert_eq!(q.tips().len(), 2);
        assert!(q.validate().is_ok());
    }

    #[test]
    fn test_optional_fields_default_to_absent() {
        let json = r#"{
            "id": "q1", "part": 2, "questionNumber": 1, "type": "Independent Speaking",
            "title": "Study habits", "question": "Do you prefer studying alone?",
            "preparationTime": 15, "responseTime": 45
        }"#;
        let q: Question = serde_json::from_str(json).unwrap();
        assert!(q.reading_passage().is_none());
        assert!(q.audio_asset().is_none());
        assert_eq!(q.reading_secs(45), 45);
        assert_eq!(q.listening_kind(), ListeningKind::Lecture);
        assert!(q.tips().is_empty());
    }

    #[test]
    fn test_blank_reading_and_audio_count_as_absent() {
        let mut q: Question = serde_json::from_str(INTEGRATED).unwrap();
        q.reading = Some("  ".to_string());
        q.audio_file = Some(String::new());
        assert!(q.reading_passage().is_none());
        assert!(q.audio_asset().is_none());
    }

    #[test]
    fn test_validate_rejects_zero_timings_and_bad_part() {
        let mut q: Question = serde_json::from_str(INTEGRATED).unwrap();
        q.preparation_time = 0;
        assert!(matches!(q.validate(), Err(ExamError::QuestionLoadError(_))));

        let mut q: Question = serde_json::from_str(INTEGRATED).unwrap();
        q.response_time = 0;
        assert!(q.validate().is_err());

        let mut q: Question = serde_json::from_str(INTEGRATED).unwrap();
        q.part = 1;
        assert!(q.validate().is_err());
    }
}

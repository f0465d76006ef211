use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{ResultView, Verdict};

#[derive(Debug, Serialize)]
pub struct SubjectSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct ResultResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_by: Uuid,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub result: Option<Verdict>,
    pub confidence: Option<f64>,
    /// Storage keys, in upload order.
    pub images: Vec<String>,
    /// Fetchable URLs for `images`, same order.
    pub image_urls: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub subject: SubjectSummary,
}

impl ResultResponse {
    pub fn new(view: ResultView, image_urls: Vec<String>) -> Self {
        Self {
            id: view.id,
            user_id: view.user_id,
            created_by: view.created_by,
            age: view.age,
            gender: view.gender,
            result: view.result,
            confidence: view.confidence,
            images: view.images,
            image_urls,
            date: view.date,
            subject: SubjectSummary {
                id: view.user_id,
                name: view.subject_name,
                email: view.subject_email,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeds_subject_summary() {
        let subject = Uuid::new_v4();
        let view = ResultView {
            id: Uuid::new_v4(),
            user_id: subject,
            created_by: Uuid::new_v4(),
            age: Some(52),
            gender: Some("female".into()),
            result: Some(Verdict::NonCancer),
            confidence: Some(80.0),
            images: vec!["results/x.jpg".into()],
            date: OffsetDateTime::now_utc(),
            subject_name: "Sam".into(),
            subject_email: "sam@example.com".into(),
        };
        let json = serde_json::to_value(ResultResponse::new(view, vec!["/uploads/results/x.jpg".into()])).unwrap();
        assert_eq!(json["subject"]["id"], subject.to_string());
        assert_eq!(json["subject"]["email"], "sam@example.com");
        assert_eq!(json["result"], "NON CANCER");
        assert_eq!(json["confidence"], 80.0);
        assert_eq!(json["image_urls"][0], "/uploads/results/x.jpg");
        assert!(json["date"].as_str().unwrap().contains('T'));
    }
}

pub mod answer;
pub mod exam;
pub mod exam_session;
pub mod proctoring_event;
pub mod question;

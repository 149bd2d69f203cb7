//! Running-status records
//!
//! A worker writes `.<host>.running.<instance>` immediately before it
//! launches a job and removes it immediately afterwards:
//!
//! ```text
//! I: 4711.12
//! J: /home/alice/analysis.sh
//! U: alice
//! N: -10
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::job::{field_value, parse_field};
use crate::error::RecordError;

/// What a worker instance is executing right now
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningStatus {
    /// Work-area tag of the job (`<pid>.<job>`)
    pub job_name: String,
    /// File originally submitted
    pub file_name: String,
    /// Login name of the owner
    pub user: String,
    /// Internal (negated) priority the job runs at
    pub priority: i32,
}

impl RunningStatus {
    pub fn render(&self) -> String {
        format!(
            "I: {}\nJ: {}\nU: {}\nN: {}\n",
            self.job_name, self.file_name, self.user, self.priority
        )
    }

    pub fn parse(text: &str) -> Result<Self, RecordError> {
        let mut job_name = None;
        let mut file_name = None;
        let mut user = None;
        let mut priority = None;

        for line in text.lines() {
            let Some(key) = line.chars().next() else {
                continue;
            };
            let value = field_value(line);
            match key {
                'I' => job_name = Some(value.to_string()),
                'J' => file_name = Some(value.to_string()),
                'U' => user = Some(value.to_string()),
                'N' => priority = Some(parse_field::<i32>('N', value)?),
                _ => {}
            }
        }

        Ok(Self {
            job_name: job_name.ok_or(RecordError::MissingField('I'))?,
            file_name: file_name.ok_or(RecordError::MissingField('J'))?,
            user: user.ok_or(RecordError::MissingField('U'))?,
            priority: priority.ok_or(RecordError::MissingField('N'))?,
        })
    }

    /// Nice value as users think of it (the stored priority negated)
    pub fn display_nice(&self) -> i32 {
        -self.priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_status_parse() {
        let status = RunningStatus {
            job_name: "4711.12".to_string(),
            file_name: "/home/alice/analysis.sh".to_string(),
            user: "alice".to_string(),
            priority: -10,
        };

        let parsed = RunningStatus::parse(&status.render()).unwrap();
        assert_eq!(parsed, status);
        assert_eq!(parsed.display_nice(), 10);
    }

    #[test]
    fn test_running_status_missing_priority() {
        let err = RunningStatus::parse("I: 1.2\nJ: a\nU: bob\n").unwrap_err();
        assert_eq!(err, RecordError::MissingField('N'));
    }
}

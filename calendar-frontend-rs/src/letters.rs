use crate::unlock::DAYS;

#[derive(Debug, thiserror::Error)]
pub enum LettersError {
    #[error("Expected {DAYS} letters, got {0}")]
    WrongCount(usize),
}

/// The text behind each day, indexed from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Letters(Vec<String>);

impl Letters {
    pub fn new(letters: Vec<String>) -> Result<Self, LettersError> {
        if letters.len() != DAYS as usize {
            return Err(LettersError::WrongCount(letters.len()));
        }
        Ok(Self(letters))
    }

    pub fn get(&self, day: u32) -> Option<&str> {
        let index = usize::try_from(day.checked_sub(1)?).ok()?;
        self.0.get(index).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letters() -> Letters {
        Letters::new((1..=DAYS).map(|day| format!("Letter {day}")).collect()).unwrap()
    }

    #[test]
    fn days_are_one_based() {
        let letters = letters();
        assert_eq!(letters.get(1), Some("Letter 1"));
        assert_eq!(letters.get(100), Some("Letter 100"));
        assert_eq!(letters.get(0), None);
        assert_eq!(letters.get(101), None);
    }

    #[test]
    fn count_must_match_days() {
        assert!(matches!(
            Letters::new(vec!["only one".to_string()]),
            Err(LettersError::WrongCount(1))
        ));
        assert!(matches!(
            Letters::new(Vec::new()),
            Err(LettersError::WrongCount(0))
        ));
    }
}

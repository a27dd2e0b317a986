use crate::error::{AppError, AppResult};
use crate::models::{Action, InteractionEvent, ItemInteraction};

/// Maps the raw `action` field from an ingestion request onto the
/// recognized set. Anything else is rejected before any side effect.
pub fn parse_action(raw: &str) -> AppResult<Action> {
    match raw {
        "view" => Ok(Action::View),
        "like" => Ok(Action::Like),
        "rate" => Ok(Action::Rate),
        other => Err(AppError::InvalidRequest(format!(
            "unknown action '{}', expected one of view, like, rate",
            other
        ))),
    }
}

/// Maps the raw `action` field of an item-interaction write onto the
/// recognized set.
pub fn parse_interaction(raw: &str) -> AppResult<ItemInteraction> {
    match raw {
        "like" => Ok(ItemInteraction::Like),
        "rate" => Ok(ItemInteraction::Rate),
        "comment" => Ok(ItemInteraction::Comment),
        other => Err(AppError::InvalidRequest(format!(
            "unknown interaction '{}', expected one of like, rate, comment",
            other
        ))),
    }
}

/// Enforces the rating contract: required integer in [0,5] when the action
/// is `rate`, meaningless (and dropped) otherwise.
pub fn validate_rating(action: Action, rating: Option<i64>) -> AppResult<Option<u8>> {
    match action {
        Action::Rate => match rating {
            Some(r) if (0..=5).contains(&r) => Ok(Some(r as u8)),
            Some(r) => Err(AppError::InvalidRequest(format!(
                "rating {} out of range, expected an integer in [0,5]",
                r
            ))),
            None => Err(AppError::InvalidRequest(
                "rating is required when action is 'rate'".to_string(),
            )),
        },
        _ => Ok(None),
    }
}

/// Rating contract for the direct interaction surface, same bounds as the
/// queued path.
pub fn validate_interaction_rating(
    kind: ItemInteraction,
    rating: Option<i64>,
) -> AppResult<Option<u8>> {
    match kind {
        ItemInteraction::Rate => match rating {
            Some(r) if (0..=5).contains(&r) => Ok(Some(r as u8)),
            Some(r) => Err(AppError::InvalidRequest(format!(
                "rating {} out of range, expected an integer in [0,5]",
                r
            ))),
            None => Err(AppError::InvalidRequest(
                "rating is required when action is 'rate'".to_string(),
            )),
        },
        _ => Ok(None),
    }
}

pub fn validate_user_id(user_id: &str) -> AppResult<()> {
    if user_id.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "user id cannot be empty".to_string(),
        ));
    }

    if user_id.contains(':') {
        // The score store encodes members as "<movieId>:<userId>"; a colon in
        // the user id would corrupt the member encoding.
        return Err(AppError::InvalidRequest(
            "user id cannot contain ':'".to_string(),
        ));
    }

    Ok(())
}

/// Defensive re-validation applied by the worker before folding an event.
/// Events are validated at ingestion, but redelivered or foreign payloads
/// may not have been.
pub fn validate_event(event: &InteractionEvent) -> AppResult<()> {
    validate_user_id(&event.user_id)?;

    if event.action == Action::Rate {
        match event.rating {
            Some(r) if r <= 5 => {}
            Some(r) => {
                return Err(AppError::InvalidRequest(format!(
                    "rating {} out of range in rate event",
                    r
                )))
            }
            None => {
                return Err(AppError::InvalidRequest(
                    "rate event is missing its rating".to_string(),
                ))
            }
        }
    }

    let now = chrono::Utc::now();
    let max_future = now + chrono::Duration::hours(1);
    if event.timestamp > max_future {
        return Err(AppError::InvalidRequest(
            "event timestamp cannot be more than 1 hour in the future".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn event(action: Action, rating: Option<u8>) -> InteractionEvent {
        InteractionEvent {
            req_id: Uuid::new_v4(),
            user_id: "alice".to_string(),
            action,
            movie_id: 10,
            rating,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_parse_action() {
        assert_eq!(parse_action("view").unwrap(), Action::View);
        assert_eq!(parse_action("like").unwrap(), Action::Like);
        assert_eq!(parse_action("rate").unwrap(), Action::Rate);
        assert!(matches!(
            parse_action("dance"),
            Err(AppError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_parse_interaction() {
        assert_eq!(
            parse_interaction("comment").unwrap(),
            ItemInteraction::Comment
        );
        assert_eq!(parse_interaction("like").unwrap(), ItemInteraction::Like);
        assert!(parse_interaction("share").is_err());
    }

    #[test]
    fn test_rating_required_and_bounded_for_rate() {
        assert_eq!(validate_rating(Action::Rate, Some(0)).unwrap(), Some(0));
        assert_eq!(validate_rating(Action::Rate, Some(5)).unwrap(), Some(5));
        assert!(validate_rating(Action::Rate, Some(6)).is_err());
        assert!(validate_rating(Action::Rate, Some(-1)).is_err());
        assert!(validate_rating(Action::Rate, None).is_err());
    }

    #[test]
    fn test_interaction_rating_bounds() {
        assert_eq!(
            validate_interaction_rating(ItemInteraction::Rate, Some(3)).unwrap(),
            Some(3)
        );
        assert!(validate_interaction_rating(ItemInteraction::Rate, Some(6)).is_err());
        assert!(validate_interaction_rating(ItemInteraction::Rate, None).is_err());
        assert_eq!(
            validate_interaction_rating(ItemInteraction::Comment, None).unwrap(),
            None
        );
    }

    #[test]
    fn test_rating_ignored_for_other_actions() {
        assert_eq!(validate_rating(Action::Like, Some(4)).unwrap(), None);
        assert_eq!(validate_rating(Action::View, None).unwrap(), None);
    }

    #[test]
    fn test_validate_event() {
        assert!(validate_event(&event(Action::Like, None)).is_ok());
        assert!(validate_event(&event(Action::Rate, Some(4))).is_ok());
        assert!(validate_event(&event(Action::Rate, None)).is_err());
        assert!(validate_event(&event(Action::Rate, Some(9))).is_err());

        let mut bad_user = event(Action::Like, None);
        bad_user.user_id = "al:ice".to_string();
        assert!(validate_event(&bad_user).is_err());

        let mut future = event(Action::Like, None);
        future.timestamp = Utc::now() + chrono::Duration::hours(2);
        assert!(validate_event(&future).is_err());
    }
}

use crate::domain::UserId;

// ============== Authorization ==============

/// Static allow-list check used in front of every admin command.
///
/// A missing caller (anonymous channel post) or an empty allow-list never passes.
pub fn is_authorized(user_id: Option<UserId>, allowed_users: &[i64]) -> bool {
    let Some(user_id) = user_id else {
        return false;
    };
    if allowed_users.is_empty() {
        return false;
    }
    allowed_users.contains(&user_id.0)
}

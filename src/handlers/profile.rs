use axum::extract::State;
use axum::response::Response;

use crate::handlers::AppState;
use crate::utils::auth::AuthUser;
use crate::utils::error::AppError;
use crate::utils::response::success;

pub async fn my_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, AppError> {
    let profile = state.profiles.get_profile(user.user_id).await?;
    Ok(success(profile, "Profile retrieved"))
}

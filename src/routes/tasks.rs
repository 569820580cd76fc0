use actix_web::{put, web, HttpResponse};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::TaskUpdate;
use crate::state::AppState;

/// Users update tasks; the admin is emailed about it.
#[put("/api/tasks/{id}")]
pub async fn update_task(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
    body: web::Json<TaskUpdate>,
) -> Result<HttpResponse, AppError> {
    let task = state
        .tasks
        .update(&user.0, path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(task))
}

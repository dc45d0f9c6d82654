use crate::commands::CommandContext;
use crate::error::{AppError, AppResult};
use crate::models::User;

pub async fn add(ctx: &CommandContext, user: User) -> AppResult<()> {
    if user.user_id.trim().is_empty() {
        return Err(AppError::InvalidArgument(
            "Cannot create a user without a user id".to_string(),
        ));
    }
    ctx.verbose("User", &user);

    ctx.users.add_user(&user).await?;
    println!("User {} created", user.user_id);
    Ok(())
}

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use warp::filters::BoxedFilter;
use warp::reply::Response;
use warp::Filter;

use super::{api, json_body, with_context, Context, Error};
use crate::models::{NewUser, User, UserChangeset};
use crate::util::{double_option, map_result};

const MAX_NAME_CHARS: usize = 100;
const MAX_EMAIL_CHARS: usize = 255;
const MAX_PROFESSION_CHARS: usize = 100;
const MIN_AGE: i32 = 13;
const MAX_AGE: i32 = 120;
const GENDERS: [&str; 4] = ["female", "male", "non-binary", "prefer-not-to-say"];

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    name: String,
    email: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    email: Option<String>,
    name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    age: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    gender: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    profession: Option<Option<String>>,
    onboarding_completed: Option<bool>,
    voice_setup_completed: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUp {
    user_id: String,
    user: User,
}

#[derive(Serialize)]
pub struct UserBody {
    user: User,
}

fn new_user_id() -> String {
    format!("user_{}", Uuid::new_v4().to_simple())
}

fn validate_name(name: &str) -> Result<String, Error> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Validation("Name is required".into()));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(Error::Validation("Name is too long".into()));
    }
    Ok(name.to_string())
}

fn validate_email(email: &str) -> Result<String, Error> {
    let email = email.trim();
    if email.chars().count() > MAX_EMAIL_CHARS {
        return Err(Error::Validation("Email address is too long".into()));
    }
    addr::parse_email_address(email)?;
    Ok(email.to_string())
}

/// Blank strings clear a nullable text field.
fn blank_to_null(value: Option<String>) -> Option<String> {
    value.map(|x| x.trim().to_string()).filter(|x| !x.is_empty())
}

impl UpdateUserRequest {
    fn validate(self) -> Result<UserChangeset, Error> {
        let email = self.email.as_deref().map(validate_email).transpose()?;
        let name = self.name.as_deref().map(validate_name).transpose()?;
        if let Some(Some(age)) = self.age {
            if age < MIN_AGE {
                return Err(Error::Validation("Must be at least 13 years old".into()));
            }
            if age > MAX_AGE {
                return Err(Error::Validation("Invalid age".into()));
            }
        }
        let gender = self.gender.map(blank_to_null);
        if let Some(Some(gender)) = &gender {
            if !GENDERS.contains(&gender.as_str()) {
                return Err(Error::Validation(format!(
                    "Gender must be one of {}",
                    GENDERS.join(", ")
                )));
            }
        }
        let profession = self.profession.map(blank_to_null);
        if let Some(Some(profession)) = &profession {
            if profession.chars().count() > MAX_PROFESSION_CHARS {
                return Err(Error::Validation("Profession is too long".into()));
            }
        }
        Ok(UserChangeset {
            email: email.map(Some),
            name: name.map(Some),
            age: self.age,
            gender,
            profession,
            onboarding_completed: self.onboarding_completed,
            voice_setup_completed: self.voice_setup_completed,
            updated_at: None,
        })
    }
}

#[tracing::instrument(
name = "Signing up a user.",
err,
level = "info",
skip(ctx),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn signup(ctx: Context, request: SignupRequest) -> Result<SignedUp, Error> {
    let name = validate_name(&request.name)?;
    let email = validate_email(&request.email)?;
    if let Some(user) = ctx.repository.find_user_by_email(&email).await? {
        info!(user_id = %user.id, "Email already registered, returning existing user.");
        return Ok(SignedUp {
            user_id: user.id.clone(),
            user,
        });
    }
    let user = ctx
        .repository
        .create_user(NewUser {
            id: new_user_id(),
            email: Some(email),
            name: Some(name),
        })
        .await?;
    Ok(SignedUp {
        user_id: user.id.clone(),
        user,
    })
}

#[tracing::instrument(
name = "Get a user.",
err,
level = "info",
skip(ctx),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn get_user(user_id: String, ctx: Context) -> Result<UserBody, Error> {
    let user = ctx
        .repository
        .get_user(&user_id)
        .await?
        .ok_or(Error::NotFound("User"))?;
    Ok(UserBody { user })
}

#[tracing::instrument(
name = "Update a user.",
err,
level = "info",
skip(ctx),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn update_user(
    user_id: String,
    ctx: Context,
    request: UpdateUserRequest,
) -> Result<UserBody, Error> {
    let changes = request.validate()?;
    if changes.is_empty() {
        return Err(Error::Validation("No fields to update".into()));
    }
    let user = ctx
        .repository
        .update_user(&user_id, changes)
        .await?
        .ok_or(Error::NotFound("User"))?;
    Ok(UserBody { user })
}

pub fn get_filters(ctx: Context) -> BoxedFilter<(Response,)> {
    let signup_filter = warp::post()
        .and(api("users"))
        .and(warp::path("signup"))
        .and(warp::path::end())
        .and(with_context(ctx.clone()))
        .and(json_body())
        .then(signup)
        .map(map_result);
    let get_filter = warp::get()
        .and(api("users"))
        .and(warp::path::param())
        .and(warp::path::end())
        .and(with_context(ctx.clone()))
        .then(get_user)
        .map(map_result);
    let update_filter = warp::patch()
        .and(api("users"))
        .and(warp::path::param())
        .and(warp::path::end())
        .and(with_context(ctx))
        .and(json_body())
        .then(update_user)
        .map(map_result);
    signup_filter
        .or(get_filter)
        .unify()
        .or(update_filter)
        .unify()
        .boxed()
}

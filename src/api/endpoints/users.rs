//! Profile and doctor directory endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::db::repository::{get_user, list_doctors, update_user_profile};
use crate::models::enums::{Gender, UserRole};
use crate::models::{DoctorSummary, User, UserProfile};

/// Partial profile update. Absent fields keep their stored value; fields
/// that do not apply to the caller's role are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub specialization: Option<String>,
    pub license_number: Option<String>,
    pub years_of_experience: Option<u32>,
    pub medical_history: Option<Vec<String>>,
    pub allergies: Option<Vec<String>>,
    pub current_medications: Option<Vec<String>>,
    pub emergency_contact: Option<String>,
}

#[derive(Serialize)]
pub struct ProfileResponse {
    pub user: User,
}

#[derive(Serialize)]
pub struct DoctorsResponse {
    pub doctors: Vec<DoctorSummary>,
}

fn clean(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn clean_list(values: Vec<String>) -> Vec<String> {
    values.into_iter().filter_map(clean).collect()
}

impl ProfileUpdate {
    /// Merge into the stored profile for a user of `role`.
    pub fn apply(self, role: UserRole, name: &mut String, profile: &mut UserProfile) -> Result<(), ApiError> {
        if let Some(n) = self.name {
            *name = clean(n).ok_or_else(|| ApiError::BadRequest("Name cannot be empty".into()))?;
        }
        if self.date_of_birth.is_some() {
            profile.date_of_birth = self.date_of_birth;
        }
        if self.gender.is_some() {
            profile.gender = self.gender;
        }
        if let Some(v) = self.phone {
            profile.phone = clean(v);
        }
        if let Some(v) = self.address {
            profile.address = clean(v);
        }

        match role {
            UserRole::Doctor => {
                if let Some(v) = self.specialization {
                    profile.specialization = clean(v);
                }
                if let Some(v) = self.license_number {
                    profile.license_number = Some(clean(v).ok_or_else(|| {
                        ApiError::BadRequest("License number cannot be empty".into())
                    })?);
                }
                if self.years_of_experience.is_some() {
                    profile.years_of_experience = self.years_of_experience;
                }
            }
            UserRole::Patient => {
                if let Some(v) = self.medical_history {
                    profile.medical_history = clean_list(v);
                }
                if let Some(v) = self.allergies {
                    profile.allergies = clean_list(v);
                }
                if let Some(v) = self.current_medications {
                    profile.current_medications = clean_list(v);
                }
                if let Some(v) = self.emergency_contact {
                    profile.emergency_contact = clean(v);
                }
            }
        }
        Ok(())
    }
}

/// `GET /api/users/profile`
pub async fn get_profile(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let user = get_user(&conn, &auth.user_id)?
        .ok_or_else(|| ApiError::NotFound("User no longer exists".into()))?;
    Ok(Json(ProfileResponse { user }))
}

/// `PUT /api/users/profile`
pub async fn update_profile(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    body: Result<Json<ProfileUpdate>, JsonRejection>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let Json(update) = body?;
    let conn = ctx.core.open_db()?;
    let mut user = get_user(&conn, &auth.user_id)?
        .ok_or_else(|| ApiError::NotFound("User no longer exists".into()))?;

    if update
        .date_of_birth
        .is_some_and(|dob| dob > Utc::now().date_naive())
    {
        return Err(ApiError::BadRequest("dateOfBirth cannot be in the future".into()));
    }
    update.apply(user.role, &mut user.name, &mut user.profile)?;

    let now = Utc::now();
    update_user_profile(&conn, &user.id, &user.name, &user.profile, now)?;
    user.updated_at = now;
    tracing::info!(user_id = %user.id, "Profile updated");

    Ok(Json(ProfileResponse { user }))
}

/// `GET /api/users/doctors`
pub async fn doctors(
    State(ctx): State<ApiContext>,
    Extension(_auth): Extension<AuthContext>,
) -> Result<Json<DoctorsResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let doctors = list_doctors(&conn)?.iter().map(DoctorSummary::from).collect();
    Ok(Json(DoctorsResponse { doctors }))
}

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{Gender, UserRole};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: UserRole,
    #[serde(flatten)]
    pub profile: UserProfile,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Editable profile fields. Doctor-only and patient-only fields share one
/// record; the ones that do not apply to a role stay empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub specialization: Option<String>,
    pub license_number: Option<String>,
    pub years_of_experience: Option<u32>,
    #[serde(default)]
    pub medical_history: Vec<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub current_medications: Vec<String>,
    pub emergency_contact: Option<String>,
}

impl UserProfile {
    /// Age in whole years on `today`, if a date of birth is on file.
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        let dob = self.date_of_birth?;
        let mut years = today.year() - dob.year();
        if (today.month(), today.day()) < (dob.month(), dob.day()) {
            years -= 1;
        }
        u32::try_from(years).ok()
    }
}

impl User {
    pub fn is_doctor(&self) -> bool {
        self.role == UserRole::Doctor
    }
}

/// Public view of a doctor, shown to patients choosing a reviewer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorSummary {
    pub id: Uuid,
    pub name: String,
    pub specialization: Option<String>,
    pub years_of_experience: Option<u32>,
}

impl From<&User> for DoctorSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            specialization: user.profile.specialization.clone(),
            years_of_experience: user.profile.years_of_experience,
        }
    }
}

/// What a reviewing doctor sees about the patient.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub age: Option<u32>,
    pub gender: Option<Gender>,
    pub medical_history: Vec<String>,
    pub allergies: Vec<String>,
    pub current_medications: Vec<String>,
}

impl PatientSummary {
    pub fn from_user(user: &User, today: NaiveDate) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            age: user.profile.age_on(today),
            gender: user.profile.gender,
            medical_history: user.profile.medical_history.clone(),
            allergies: user.profile.allergies.clone(),
            current_medications: user.profile.current_medications.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn age_counts_completed_years() {
        let profile = UserProfile {
            date_of_birth: Some(date(1960, 6, 15)),
            ..Default::default()
        };
        assert_eq!(profile.age_on(date(2020, 6, 14)), Some(59));
        assert_eq!(profile.age_on(date(2020, 6, 15)), Some(60));
    }

    #[test]
    fn age_unknown_without_birth_date() {
        assert_eq!(UserProfile::default().age_on(date(2020, 1, 1)), None);
    }

    #[test]
    fn age_in_future_is_none() {
        let profile = UserProfile {
            date_of_birth: Some(date(2030, 1, 1)),
            ..Default::default()
        };
        assert_eq!(profile.age_on(date(2020, 1, 1)), None);
    }

    #[test]
    fn password_hash_never_serialized() {
        let user = User {
            id: Uuid::new_v4(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            password_hash: "secret".into(),
            role: UserRole::Patient,
            profile: UserProfile::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["role"], "patient");
    }
}

use serde::Serialize;

use crate::commands::TrackerState;
use crate::db::store::UserProfile;

#[derive(Debug, Serialize)]
pub struct ProfileStatus {
    pub device_id: String,
    pub name: Option<String>,
    /// The shell should ask for a name before intake is recorded.
    pub needs_name: bool,
}

pub async fn get_profile(state: &TrackerState) -> Result<ProfileStatus, String> {
    let session = state.lock().map_err(|e| e.to_string())?;
    let identity = &session.identity;
    Ok(ProfileStatus {
        device_id: identity.device_id.clone(),
        name: identity.display_name.clone(),
        needs_name: identity.display_name.is_none(),
    })
}

/// Store the display name for this device
pub async fn save_user_name(state: &TrackerState, name: String) -> Result<(), String> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err("Por favor, ingresa tu nombre.".into());
    }
    let device_id = state.lock().map_err(|e| e.to_string())?.identity.device_id.clone();

    state
        .store
        .save_profile(&device_id, &UserProfile { name: name.clone() })
        .await
        .map_err(|e| {
            log::error!("Error saving user name: {}", e);
            e.to_string()
        })?;

    let mut session = state.lock().map_err(|e| e.to_string())?;
    session.identity.display_name = Some(name);
    Ok(())
}

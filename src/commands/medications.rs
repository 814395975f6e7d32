use crate::commands::TrackerState;
use crate::error::TrackerError;
use crate::services::medication::{self, MedicationDraft, MedicationRule};

/// Enter edit mode with the edit PIN
pub async fn unlock_editing(state: &TrackerState, pin: String) -> Result<(), String> {
    let mut session = state.lock().map_err(|e| e.to_string())?;
    if pin.trim() != state.settings.edit_pin {
        return Err(TrackerError::InvalidPin.to_string());
    }
    session.editing_unlocked = true;
    Ok(())
}

pub async fn lock_editing(state: &TrackerState) -> Result<(), String> {
    let mut session = state.lock().map_err(|e| e.to_string())?;
    session.editing_unlocked = false;
    Ok(())
}

pub async fn list_medications(state: &TrackerState) -> Result<Vec<MedicationRule>, String> {
    let session = state.lock().map_err(|e| e.to_string())?;
    Ok(session.view.rules().to_vec())
}

fn current_rules_if_unlocked(state: &TrackerState) -> Result<Vec<MedicationRule>, String> {
    let session = state.lock().map_err(|e| e.to_string())?;
    if !session.editing_unlocked {
        return Err(TrackerError::EditLocked.to_string());
    }
    Ok(session.view.rules().to_vec())
}

/// Write the full list, then reconcile the active day against it.
async fn persist_rules(state: &TrackerState, rules: Vec<MedicationRule>) -> Result<(), String> {
    state.store.save_definitions(&rules).await.map_err(|e| {
        log::error!("Error saving medication definitions: {}", e);
        format!("Hubo un error al guardar el medicamento: {}", e)
    })?;
    let mut session = state.lock().map_err(|e| e.to_string())?;
    session.view.set_rules(rules);
    Ok(())
}

/// Add a medication (`id` is `None`) or replace the one with `id`
pub async fn save_medication(
    state: &TrackerState,
    id: Option<String>,
    draft: MedicationDraft,
) -> Result<MedicationRule, String> {
    let rules = current_rules_if_unlocked(state)?;
    if let Some(id) = &id {
        if !rules.iter().any(|r| &r.id == id) {
            return Err(TrackerError::NotFound { entity: "medication".into(), id: id.clone() }
                .to_string());
        }
    }

    let rule = draft
        .into_rule(id.unwrap_or_else(medication::new_rule_id))
        .map_err(|e| e.to_string())?;
    persist_rules(state, medication::upsert_rule(&rules, rule.clone())).await?;
    log::info!("Medication '{}' saved", rule.id);
    Ok(rule)
}

pub async fn delete_medication(state: &TrackerState, id: String) -> Result<(), String> {
    let rules = current_rules_if_unlocked(state)?;
    if !rules.iter().any(|r| r.id == id) {
        return Err(TrackerError::NotFound { entity: "medication".into(), id }.to_string());
    }
    persist_rules(state, medication::remove_rule(&rules, &id)).await?;
    log::info!("Medication '{}' deleted", id);
    Ok(())
}

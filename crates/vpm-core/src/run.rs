//! Script acknowledgment (spec §1/§4.8): the PM core records that a
//! `package.json` script was requested and returns its command string, but
//! never spawns a shell to run it — that is explicitly out of scope
//! (no lifecycle-script execution).

use serde_json::Value;

use crate::error::PmError;

/// Looks up `script_name` in `manifest`'s `scripts` object and returns its
/// command string, without executing it. Fails with `ScriptError` if there
/// is no `scripts` object, or no entry for `script_name`.
pub fn record_script_request(manifest: &Value, script_name: &str) -> Result<String, PmError> {
    let scripts = manifest.get("scripts").and_then(|s| s.as_object()).ok_or_else(|| PmError::ScriptError {
        script: script_name.to_string(),
        message: "package.json has no \"scripts\" object".to_string(),
    })?;

    let cmd = scripts.get(script_name).and_then(|c| c.as_str()).ok_or_else(|| PmError::ScriptError {
        script: script_name.to_string(),
        message: format!("missing script \"{}\" in package.json", script_name),
    })?;

    if cmd.trim().is_empty() {
        return Err(PmError::ScriptError { script: script_name.to_string(), message: format!("script \"{}\" is empty", script_name) });
    }

    Ok(cmd.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn returns_the_recorded_command_without_running_it() {
        let manifest = json!({ "scripts": { "build": "tsc -p ." } });
        assert_eq!(record_script_request(&manifest, "build").unwrap(), "tsc -p .");
    }

    #[test]
    fn missing_scripts_object_is_a_script_error() {
        let manifest = json!({ "name": "x" });
        let err = record_script_request(&manifest, "build").unwrap_err();
        assert_eq!(err.code(), "SCRIPT_ERROR");
    }

    #[test]
    fn missing_script_entry_is_a_script_error() {
        let manifest = json!({ "scripts": { "test": "jest" } });
        let err = record_script_request(&manifest, "build").unwrap_err();
        assert_eq!(err.code(), "SCRIPT_ERROR");
    }

    #[test]
    fn empty_script_command_is_a_script_error() {
        let manifest = json!({ "scripts": { "build": "   " } });
        let err = record_script_request(&manifest, "build").unwrap_err();
        assert_eq!(err.code(), "SCRIPT_ERROR");
    }
}

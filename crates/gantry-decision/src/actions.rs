//! Action manifest
//!
//! Every decision run publishes `actions.json`: the callback actions that
//! apply to this run, each with the JSON schema its input must satisfy.
//! Action handlers re-invoke the generation with the persisted graph and
//! parameters as their starting point.

use serde_json::{json, Value};

use gantry_core::Parameters;

/// Manifest format version
pub const ACTIONS_VERSION: u64 = 1;

/// Build the action manifest for one run
pub fn action_manifest(params: &Parameters, decision_id: &str) -> Value {
    json!({
        "version": ACTIONS_VERSION,
        "variables": {
            "project": params.project(),
            "head-rev": params.head_rev(),
            "pushid": params.push_id(),
            "decision-id": decision_id,
        },
        "actions": [
            {
                "name": "retrigger",
                "title": "Retrigger",
                "description": "Create a new run of the selected tasks",
                "kind": "task",
                "input-schema": {
                    "type": "object",
                    "properties": {
                        "labels": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "Labels to retrigger",
                        },
                        "times": {
                            "type": "integer",
                            "minimum": 1,
                            "maximum": 100,
                            "default": 1,
                        },
                    },
                    "required": ["labels"],
                },
            },
            {
                "name": "add-tasks",
                "title": "Add tasks",
                "description": "Schedule tasks that were not part of the original target set",
                "kind": "task",
                "input-schema": {
                    "type": "object",
                    "properties": {
                        "labels": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "Labels to add to this push",
                        },
                    },
                    "required": ["labels"],
                },
            },
            {
                "name": "rerun-backstop",
                "title": "Rerun as backstop",
                "description": "Regenerate this push's graph with optimization disabled",
                "kind": "task",
                "input-schema": {"type": "object", "properties": {}},
            },
        ],
    })
}

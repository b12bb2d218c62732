// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Workflow request template
//!
//! The provider runs a node-graph workflow. A request body looks like:
//!
//! ```text
//! {
//!   "input": {
//!     "workflow": { "<node>": { "inputs": { "text": ... }, ... }, ... },
//!     "images": [ { "name": "subject.png", "image": "<base64>" }, ... ]
//!   },
//!   "webhook": "<callback url>"
//! }
//! ```
//!
//! `images[0]` is the subject photo, `images[1]` the optional style reference.

use serde_json::{json, Value};

use crate::error::{Error, Result};

const SUBJECT_IMAGE_NAME: &str = "subject.png";
const STYLE_IMAGE_NAME: &str = "style.png";

/// Request body template with designated injection points
#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    body: Value,
    prompt_node: String,
}

impl WorkflowTemplate {
    pub fn new(body: Value, prompt_node: impl Into<String>) -> Result<Self> {
        let template = Self {
            body,
            prompt_node: prompt_node.into(),
        };
        template.validate()?;
        Ok(template)
    }

    /// Load a template from disk, or fall back to the built-in one
    pub async fn load(path: Option<&str>, prompt_node: &str) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = tokio::fs::read_to_string(path).await?;
                let body: Value = serde_json::from_str(&raw)?;
                Self::new(body, prompt_node)
            }
            None => Self::new(default_workflow(prompt_node), prompt_node),
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.body["input"]["images"].is_array() {
            return Err(Error::Config("workflow template lacks input.images".to_string()));
        }
        if !self.body["input"]["workflow"][&self.prompt_node]["inputs"].is_object() {
            return Err(Error::Config(format!(
                "workflow template lacks node {} with inputs",
                self.prompt_node
            )));
        }
        Ok(())
    }

    /// Fill the template for one job
    pub fn render(
        &self,
        subject_b64: &str,
        style_b64: Option<&str>,
        descriptor: &str,
        callback_url: &str,
    ) -> Value {
        let mut body = self.body.clone();

        set_image(&mut body["input"]["images"], 0, SUBJECT_IMAGE_NAME, subject_b64);
        if let Some(style) = style_b64 {
            set_image(&mut body["input"]["images"], 1, STYLE_IMAGE_NAME, style);
        }

        body["input"]["workflow"][&self.prompt_node]["inputs"]["text"] = Value::String(descriptor.to_string());
        body["webhook"] = Value::String(callback_url.to_string());

        body
    }
}

fn set_image(images: &mut Value, index: usize, name: &str, payload: &str) {
    let Some(list) = images.as_array_mut() else {
        return;
    };
    while list.len() <= index {
        list.push(json!({ "name": name, "image": "" }));
    }
    list[index]["image"] = Value::String(payload.to_string());
}

/// Built-in hair-swap workflow: subject loader, optional style loader,
/// prompt encoder and a PNG output node.
fn default_workflow(prompt_node: &str) -> Value {
    let mut workflow = json!({
        "10": {
            "class_type": "LoadImage",
            "inputs": { "image": SUBJECT_IMAGE_NAME }
        },
        "11": {
            "class_type": "LoadImage",
            "inputs": { "image": STYLE_IMAGE_NAME }
        },
        "20": {
            "class_type": "HairStyleTransfer",
            "inputs": {
                "subject": ["10", 0],
                "style": ["11", 0],
                "conditioning": [prompt_node, 0],
                "steps": 30,
                "denoise": 0.75
            }
        },
        "30": {
            "class_type": "SaveImageWebsocket",
            "inputs": { "images": ["20", 0] }
        }
    });
    workflow[prompt_node] = json!({
        "class_type": "CLIPTextEncode",
        "inputs": { "text": "" }
    });

    json!({
        "input": {
            "workflow": workflow,
            "images": [ { "name": SUBJECT_IMAGE_NAME, "image": "" } ]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> WorkflowTemplate {
        WorkflowTemplate::new(default_workflow("12"), "12").unwrap()
    }

    #[test]
    fn test_render_injects_all_fields() {
        let body = template().render("AAAA", None, "Afro, short", "https://app/webhook");

        assert_eq!(body["input"]["images"][0]["image"], "AAAA");
        assert_eq!(body["input"]["images"].as_array().unwrap().len(), 1);
        assert_eq!(body["input"]["workflow"]["12"]["inputs"]["text"], "Afro, short");
        assert_eq!(body["webhook"], "https://app/webhook");
    }

    #[test]
    fn test_render_with_style_reference() {
        let body = template().render("AAAA", Some("BBBB"), "bantu knots", "https://app/webhook");

        let images = body["input"]["images"].as_array().unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[1]["name"], STYLE_IMAGE_NAME);
        assert_eq!(images[1]["image"], "BBBB");
    }

    #[test]
    fn test_render_does_not_mutate_template() {
        let template = template();
        let _ = template.render("AAAA", None, "x", "y");
        let again = template.render("CCCC", None, "z", "y");
        assert_eq!(again["input"]["images"][0]["image"], "CCCC");
    }

    #[test]
    fn test_missing_prompt_node_rejected() {
        let err = WorkflowTemplate::new(default_workflow("12"), "99").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}

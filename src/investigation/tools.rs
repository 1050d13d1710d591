use serde_json::{json, Value};

use crate::models::{InvestigationTool, ToolDescriptor};

// ============================================================================
// Tool Catalog
// ============================================================================

fn description(tool: InvestigationTool) -> &'static str {
    match tool {
        InvestigationTool::ScreenshotAnalysis => {
            "Capture the visible page and describe its layout, prominent controls and any dialogs or overlays"
        }
        InvestigationTool::TextExtraction => {
            "Extract the visible text of the page or of one element, to confirm labels, messages and values"
        }
        InvestigationTool::FullDomRetrieval => {
            "Retrieve the complete DOM of the page. Large; use only when targeted extraction was not enough"
        }
        InvestigationTool::SubDomExtraction => {
            "Retrieve the DOM subtree under a selector, with element attributes, to pin down reliable selectors"
        }
    }
}

/// JSON Schema for the parameters the tool accepts
fn parameters(tool: InvestigationTool) -> Value {
    match tool {
        InvestigationTool::ScreenshotAnalysis => json!({
            "type": "object",
            "properties": {
                "focus": {
                    "type": "string",
                    "description": "What to look for in the screenshot"
                },
                "fullPage": {
                    "type": "boolean",
                    "description": "Capture the full scrollable page instead of the viewport"
                }
            }
        }),
        InvestigationTool::TextExtraction => json!({
            "type": "object",
            "properties": {
                "selector": {
                    "type": "string",
                    "description": "CSS selector of the element to read; omit for the whole page"
                },
                "maxLength": {
                    "type": "integer",
                    "description": "Maximum number of characters to return"
                }
            }
        }),
        InvestigationTool::FullDomRetrieval => json!({
            "type": "object",
            "properties": {
                "includeHidden": {
                    "type": "boolean",
                    "description": "Include elements that are not currently visible"
                }
            }
        }),
        InvestigationTool::SubDomExtraction => json!({
            "type": "object",
            "properties": {
                "selector": {
                    "type": "string",
                    "description": "CSS selector of the subtree root"
                },
                "maxDepth": {
                    "type": "integer",
                    "description": "How many levels below the root to include"
                }
            },
            "required": ["selector"]
        }),
    }
}

pub fn tool_descriptor(tool: InvestigationTool, priority: usize) -> ToolDescriptor {
    ToolDescriptor {
        name: tool,
        description: description(tool).to_string(),
        parameters: parameters(tool),
        priority,
    }
}

/// Descriptors in the given order; priority 1 is the first tool
pub fn describe_tools(ordered: &[InvestigationTool]) -> Vec<ToolDescriptor> {
    ordered
        .iter()
        .enumerate()
        .map(|(i, tool)| tool_descriptor(*tool, i + 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_tool_has_object_parameters() {
        for tool in InvestigationTool::ALL {
            let descriptor = tool_descriptor(tool, 1);
            assert_eq!(descriptor.parameters["type"], "object");
            assert!(!descriptor.description.is_empty());
        }
    }

    #[test]
    fn test_priorities_follow_order() {
        let descriptors = describe_tools(&[
            InvestigationTool::SubDomExtraction,
            InvestigationTool::TextExtraction,
        ]);
        assert_eq!(descriptors[0].name, InvestigationTool::SubDomExtraction);
        assert_eq!(descriptors[0].priority, 1);
        assert_eq!(descriptors[1].priority, 2);
        assert_eq!(descriptors[0].parameters["required"][0], "selector");
    }
}

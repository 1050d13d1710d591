//! Built-in prompt templates, one per prompt type.

use super::engine::{PromptTemplate, TemplateVariable, VariableType};
use crate::models::PromptType;

const AGENT_PREAMBLE: &str = r#"You are a browser automation agent executing a workflow one step at a time. You work in an INVESTIGATE -> ACT -> REFLECT loop: look at the page, issue commands for the current step, then judge whether the step achieved its goal."#;

const RESPONSE_FOOTER: &str = r#"RESPONSE FORMAT:
{{schema}}
{{#if hasExamples}}
EXAMPLES:
{{examples}}
{{/if}}
Always respond with valid JSON matching the schema. No other text."#;

const INITIAL_ACTION_BODY: &str = r#"{{preamble}}

CURRENT STEP ({{stepNumber}} of {{totalSteps}}):
{{stepContent}}

INSTRUCTIONS:
{{instructions}}
{{#if hasPageState}}
CURRENT PAGE STATE:
{{pageState}}
{{/if}}{{#if hasWorkingMemory}}
WORKING MEMORY:
{{workingMemory}}
{{/if}}{{#if hasCustomInstructions}}
ADDITIONAL INSTRUCTIONS:
{{customInstructions}}
{{/if}}
{{footer}}"#;

const ACTION_WITH_VALIDATION_BODY: &str = r#"{{preamble}}

CURRENT STEP ({{stepNumber}} of {{totalSteps}}):
{{stepContent}}

INSTRUCTIONS:
{{instructions}}
{{#if hasHistory}}
EXECUTION HISTORY:
{{history}}
{{/if}}{{#if hasValidation}}
VALIDATE THE PREVIOUS STEP FIRST:
{{validation}}
{{/if}}{{#if hasPageState}}
CURRENT PAGE STATE:
{{pageState}}
{{/if}}{{#if hasFilteredContext}}
FILTERED CONTEXT:
{{filteredContext}}
{{/if}}{{#if hasWorkingMemory}}
WORKING MEMORY:
{{workingMemory}}
{{/if}}{{#if hasCustomInstructions}}
ADDITIONAL INSTRUCTIONS:
{{customInstructions}}
{{/if}}
{{footer}}"#;

const REFLECTION_BODY: &str = r#"{{preamble}}

You are in the REFLECT stage. Decide whether step {{completedStepNumber}} achieved its goal before step {{stepNumber}} of {{totalSteps}} runs.

NEXT STEP:
{{stepContent}}

INSTRUCTIONS:
{{instructions}}

VALIDATION RUBRIC:
{{validation}}
{{#if hasHistory}}
EXECUTION HISTORY:
{{history}}
{{/if}}{{#if hasPageState}}
CURRENT PAGE STATE:
{{pageState}}
{{/if}}{{#if hasWorkingMemory}}
WORKING MEMORY:
{{workingMemory}}
{{/if}}
{{footer}}"#;

const INVESTIGATION_BODY: &str = r#"{{preamble}}

You are in the INVESTIGATE stage, phase: {{phaseName}}. Do not act on the page yet. Use the investigation tools to learn enough about the page to complete step {{stepNumber}} of {{totalSteps}}.

STEP UNDER INVESTIGATION:
{{stepContent}}

INSTRUCTIONS:
{{instructions}}

INVESTIGATION PLAN:
{{investigation}}
{{#if hasHistory}}
EXECUTION HISTORY:
{{history}}
{{/if}}{{#if hasInvestigationHistory}}
PREVIOUS INVESTIGATIONS:
{{investigationHistory}}
{{/if}}{{#if hasWorkingMemory}}
WORKING MEMORY:
{{workingMemory}}
{{/if}}
{{footer}}"#;

const ACTION_WITH_INVESTIGATION_BODY: &str = r#"{{preamble}}

You have finished investigating the page. Use the findings below to act on step {{stepNumber}} of {{totalSteps}}.

CURRENT STEP:
{{stepContent}}

INSTRUCTIONS:
{{instructions}}
{{#if hasHistory}}
EXECUTION HISTORY:
{{history}}
{{/if}}{{#if hasPageState}}
CURRENT PAGE STATE:
{{pageState}}
{{/if}}{{#if hasWorkingMemory}}
WORKING MEMORY:
{{workingMemory}}
{{/if}}
{{footer}}"#;

fn common_variables() -> Vec<TemplateVariable> {
    use VariableType::*;
    vec![
        TemplateVariable::required("preamble", String),
        TemplateVariable::required("stepNumber", Number),
        TemplateVariable::required("totalSteps", Number),
        TemplateVariable::required("stepContent", String),
        TemplateVariable::required("instructions", String),
        TemplateVariable::required("footer", String),
        TemplateVariable::optional("hasPageState", Boolean),
        TemplateVariable::optional("pageState", String),
        TemplateVariable::optional("hasWorkingMemory", Boolean),
        TemplateVariable::optional("workingMemory", String),
    ]
}

fn with_extra(extra: &[(&str, VariableType, bool)]) -> Vec<TemplateVariable> {
    let mut variables = common_variables();
    for (name, var_type, required) in extra {
        variables.push(if *required {
            TemplateVariable::required(name, *var_type)
        } else {
            TemplateVariable::optional(name, *var_type)
        });
    }
    variables
}

fn template(
    prompt_type: PromptType,
    name: &str,
    body: &str,
    variables: Vec<TemplateVariable>,
) -> PromptTemplate {
    PromptTemplate {
        id: prompt_type.default_template_id().to_string(),
        name: name.to_string(),
        body: body.to_string(),
        variables,
        version: "1.0.0".to_string(),
        prompt_type: Some(prompt_type),
    }
}

/// Shared fragments substituted before the per-type placeholders
pub fn preamble() -> &'static str {
    AGENT_PREAMBLE
}

pub fn response_footer() -> &'static str {
    RESPONSE_FOOTER
}

/// The templates registered when a prompt manager is created
pub fn default_templates() -> Vec<PromptTemplate> {
    use VariableType::*;

    vec![
        template(
            PromptType::InitialAction,
            "Initial action",
            INITIAL_ACTION_BODY,
            with_extra(&[
                ("hasCustomInstructions", Boolean, false),
                ("customInstructions", String, false),
            ]),
        ),
        template(
            PromptType::ActionWithValidation,
            "Action with validation",
            ACTION_WITH_VALIDATION_BODY,
            with_extra(&[
                ("hasHistory", Boolean, false),
                ("history", String, false),
                ("hasValidation", Boolean, false),
                ("validation", String, false),
                ("hasFilteredContext", Boolean, false),
                ("filteredContext", String, false),
                ("hasCustomInstructions", Boolean, false),
                ("customInstructions", String, false),
            ]),
        ),
        template(
            PromptType::ReflectionAndValidation,
            "Reflection and validation",
            REFLECTION_BODY,
            with_extra(&[
                ("completedStepNumber", Number, true),
                ("validation", String, true),
                ("hasHistory", Boolean, false),
                ("history", String, false),
            ]),
        ),
        template(
            PromptType::InvestigationInitialAssessment,
            "Investigation phase",
            INVESTIGATION_BODY,
            with_extra(&[
                ("phaseName", String, true),
                ("investigation", String, true),
                ("hasHistory", Boolean, false),
                ("history", String, false),
                ("hasInvestigationHistory", Boolean, false),
                ("investigationHistory", String, false),
            ]),
        ),
        template(
            PromptType::ActionWithInvestigation,
            "Action with investigation",
            ACTION_WITH_INVESTIGATION_BODY,
            with_extra(&[("hasHistory", Boolean, false), ("history", String, false)]),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateEngine;

    #[test]
    fn test_default_templates_are_valid() {
        let engine = TemplateEngine::new();
        for template in default_templates() {
            engine
                .validate(&template)
                .unwrap_or_else(|e| panic!("{} invalid: {}", template.id, e));
        }
    }

    #[test]
    fn test_every_prompt_type_has_a_template() {
        let ids: Vec<String> = default_templates().into_iter().map(|t| t.id).collect();
        for ty in [
            PromptType::InitialAction,
            PromptType::ActionWithValidation,
            PromptType::ReflectionAndValidation,
            PromptType::InvestigationInitialAssessment,
            PromptType::InvestigationFocusedExploration,
            PromptType::InvestigationSelectorDetermination,
            PromptType::ActionWithInvestigation,
        ] {
            assert!(ids.contains(&ty.default_template_id().to_string()));
        }
    }
}

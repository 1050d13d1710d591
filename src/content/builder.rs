use serde_json::{json, Value};

use super::schema::required_fields;
use crate::error::{PromptError, Result};
use crate::models::{
    ContextSection, DecisionAction, DecisionRule, ExamplesSection, InstructionSection,
    InvestigationSection, PromptContent, PromptExample, PromptType, ReasoningDepth,
    SchemaSection, ValidationCriterion, ValidationSection, WorkingMemorySection,
};
use crate::template::library::{preamble, response_footer};
use crate::template::{PromptTemplate, TemplateEngine, TemplateVariables};

/// Everything the builder needs to assemble one prompt's content
pub struct ContentRequest<'a> {
    pub prompt_type: PromptType,
    pub template: &'a PromptTemplate,
    pub context: ContextSection,
    pub instructions: InstructionSection,
    pub validation: Option<ValidationSection>,
    pub investigation: Option<InvestigationSection>,
    pub working_memory: Option<WorkingMemorySection>,
    pub schema: SchemaSection,
    pub examples: Option<ExamplesSection>,
    pub custom_instructions: Option<&'a str>,
    /// Step whose outcome a reflection prompt judges
    pub completed_step_index: Option<usize>,
    /// Appended after the rendered template
    pub investigation_summary: Option<String>,
}

/// Assembled content plus anything worth recording in the prompt metadata
pub struct BuiltContent {
    pub content: PromptContent,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ContentBuilder {
    engine: TemplateEngine,
}

impl ContentBuilder {
    pub fn new() -> Self {
        Self {
            engine: TemplateEngine::new(),
        }
    }

    // ========================================================================
    // Sections
    // ========================================================================

    pub fn build_instruction_section(
        &self,
        prompt_type: PromptType,
        step_content: &str,
        depth: ReasoningDepth,
        has_validation: bool,
    ) -> InstructionSection {
        let base = match prompt_type {
            PromptType::InitialAction => {
                "Work out the browser commands that complete the current step, starting from the page as it is now."
            }
            PromptType::ActionWithValidation => {
                "First confirm the previous step achieved its goal, then work out the browser commands that complete the current step."
            }
            PromptType::ReflectionAndValidation => {
                "Judge whether the completed step achieved its goal and decide how the workflow should continue."
            }
            PromptType::InvestigationInitialAssessment
            | PromptType::InvestigationFocusedExploration
            | PromptType::InvestigationSelectorDetermination => {
                "Investigate the page with the available tools. Do not change the page; gather what is needed to act reliably."
            }
            PromptType::ActionWithInvestigation => {
                "Use the investigation findings to issue the browser commands that complete the current step."
            }
        };

        let main_instruction = match depth {
            ReasoningDepth::Basic => base.to_string(),
            ReasoningDepth::Detailed => format!(
                "{} Explain your analysis and why the chosen commands achieve the step.",
                base
            ),
            ReasoningDepth::Comprehensive => format!(
                "{} Analyse the page state and history in depth, consider alternative approaches and their risks, and justify the chosen commands and your confidence.",
                base
            ),
        };

        let decision_framework = DecisionAction::ALL
            .iter()
            .map(|d| format!("{}: {}", d, decision_condition(*d)))
            .collect::<Vec<_>>()
            .join("\n");

        let mut action_guidelines = vec![
            "Use selectors that uniquely identify one element; prefer ids, data attributes, labels and roles".to_string(),
            "Only reference elements that exist in the page state you were given".to_string(),
            "Issue the fewest commands that complete the step".to_string(),
        ];
        if depth != ReasoningDepth::Basic {
            action_guidelines
                .push("Report a confidence between 0 and 1 that honestly reflects uncertainty".to_string());
        }

        let validation_requirements = (has_validation
            || prompt_type == PromptType::ReflectionAndValidation)
            .then(|| {
                vec![
                    "Compare the page state with the expected outcome of the previous step".to_string(),
                    "Choose RETRY or INVESTIGATE instead of PROCEED when the outcome is unclear".to_string(),
                ]
            });

        let investigation_guidance = match prompt_type {
            t if t.is_investigation() => Some(vec![
                "Follow the investigation strategy and try fallbacks only when needed".to_string(),
                "Return commands that only call investigation tools".to_string(),
                "Use INVESTIGATE as the decision until you have what the phase expects".to_string(),
            ]),
            PromptType::ActionWithInvestigation => Some(vec![
                "Prefer selectors confirmed during investigation".to_string(),
                "Choose INVESTIGATE again if the findings do not cover the step".to_string(),
            ]),
            _ => None,
        };

        InstructionSection {
            main_instruction,
            step_guidance: format!("Current step: {}", step_content),
            decision_framework,
            action_guidelines,
            validation_requirements,
            investigation_guidance,
        }
    }

    /// Fixed rubric for judging the step at `completed_step_index`
    pub fn build_validation_section(
        &self,
        session_id: &str,
        completed_step_index: usize,
        expected_outcome: Option<&str>,
    ) -> ValidationSection {
        let criterion = |name: &str, description: &str, weight: f64| ValidationCriterion {
            name: name.to_string(),
            description: description.to_string(),
            weight,
        };

        ValidationSection {
            session_id: session_id.to_string(),
            last_step_index: completed_step_index,
            expected_outcome: expected_outcome
                .map(str::to_string)
                .unwrap_or_else(|| {
                    format!(
                        "Step {} completed without errors and the page reflects its effect",
                        completed_step_index + 1
                    )
                }),
            validation_criteria: vec![
                criterion(
                    "goalAchieved",
                    "The page shows the result the step was meant to produce",
                    0.4,
                ),
                criterion(
                    "pageState",
                    "The page is in a state from which the next step can run",
                    0.3,
                ),
                criterion(
                    "noErrors",
                    "No error messages, failed commands or unexpected dialogs",
                    0.2,
                ),
                criterion(
                    "dataIntegrity",
                    "Entered or extracted values match what the step specified",
                    0.1,
                ),
            ],
            success_indicators: vec![
                "Expected elements, text or URL are present".to_string(),
                "All commands of the step reported success".to_string(),
            ],
            failure_indicators: vec![
                "Error message or validation warning on the page".to_string(),
                "Page unchanged after commands that should change it".to_string(),
                "A command failed or targeted a missing element".to_string(),
            ],
            decision_framework: DecisionAction::ALL
                .iter()
                .map(|d| DecisionRule {
                    decision: *d,
                    condition: decision_condition(*d).to_string(),
                })
                .collect(),
        }
    }

    pub fn build_schema_section(&self, schema: &serde_json::Value) -> SchemaSection {
        SchemaSection {
            response_format: "json".to_string(),
            schema: schema.clone(),
            required_fields: required_fields(schema),
        }
    }

    pub fn build_examples_section(&self, prompt_type: PromptType) -> ExamplesSection {
        let example = |description: &str, response: Value| PromptExample {
            description: description.to_string(),
            response,
        };

        let examples = if prompt_type.is_investigation() {
            vec![example(
                "Ask for a targeted extraction before acting",
                json!({
                    "decision": { "action": "INVESTIGATE", "message": "Need the login form markup" },
                    "reasoning": {
                        "analysis": "The screenshot shows a login form in the page header",
                        "rationale": "The form's DOM gives reliable selectors for the inputs",
                        "expectedOutcome": "Selectors for the username and password inputs",
                        "confidence": 0.7
                    },
                    "commands": [
                        { "action": "sub_dom_extraction", "selector": "header form" }
                    ]
                }),
            )]
        } else if prompt_type == PromptType::ReflectionAndValidation {
            vec![
                example(
                    "The previous step worked",
                    json!({
                        "decision": { "action": "PROCEED", "message": "Search results are shown" },
                        "reasoning": {
                            "analysis": "The results list is visible and the query is in the search box",
                            "rationale": "This is the expected outcome of the search step",
                            "expectedOutcome": "The next step can open a result",
                            "confidence": 0.9
                        },
                        "commands": []
                    }),
                ),
                example(
                    "The previous step needs another attempt",
                    json!({
                        "decision": { "action": "RETRY", "message": "The form was not submitted" },
                        "reasoning": {
                            "analysis": "The page still shows the empty form",
                            "rationale": "The click probably hit an overlay",
                            "expectedOutcome": "The form submits on the next attempt",
                            "confidence": 0.6
                        },
                        "commands": []
                    }),
                ),
            ]
        } else {
            vec![example(
                "Type into a field and submit",
                json!({
                    "decision": { "action": "PROCEED", "message": "Searching for running shoes" },
                    "reasoning": {
                        "analysis": "The search input is visible with id search-input",
                        "rationale": "Typing the query and pressing enter completes the step",
                        "expectedOutcome": "A results page for running shoes",
                        "confidence": 0.85
                    },
                    "commands": [
                        { "action": "TYPE", "selector": "#search-input", "value": "running shoes" },
                        { "action": "PRESS_KEY", "value": "Enter" }
                    ]
                }),
            )]
        };

        ExamplesSection { examples }
    }

    // ========================================================================
    // Assembly
    // ========================================================================

    pub fn build_prompt_content(&self, request: ContentRequest<'_>) -> Result<BuiltContent> {
        let mut warnings = Vec::new();
        let vars = self.template_variables(&request)?;

        let missing = self.engine.missing_required(request.template, &vars);
        if !missing.is_empty() {
            tracing::warn!(
                "Template {} rendered without required variables: {}",
                request.template.id,
                missing.join(", ")
            );
            warnings.push(format!(
                "Template {} is missing required variables: {}",
                request.template.id,
                missing.join(", ")
            ));
        }

        let mut system_message = self.engine.render_template(request.template, &vars);
        if let Some(summary) = request
            .investigation_summary
            .as_deref()
            .filter(|s| !s.is_empty())
        {
            system_message.push_str("\n\nINVESTIGATION FINDINGS:\n");
            system_message.push_str(summary);
        }

        Ok(BuiltContent {
            content: PromptContent {
                system_message,
                context_section: request.context,
                instruction_section: request.instructions,
                validation_section: request.validation,
                investigation_section: request.investigation,
                working_memory_section: request.working_memory,
                schema_section: request.schema,
                examples_section: request.examples,
            },
            warnings,
        })
    }

    fn template_variables(&self, request: &ContentRequest<'_>) -> Result<TemplateVariables> {
        let mut vars = TemplateVariables::new();
        let step = &request.context.current_step;

        let mut set = |name: &str, value: Value| {
            vars.insert(name.to_string(), value);
        };

        set("preamble", json!(preamble()));
        set("stepNumber", json!(step.index + 1));
        set("totalSteps", json!(step.total_steps));
        set("stepContent", json!(step.content));
        set("instructions", json!(render_instructions(&request.instructions)));
        set("context", json!(to_json(&request.context, "context")?));

        let history = request.context.execution_history.digest.clone();
        set("hasHistory", json!(!history.is_empty()));
        set("history", json!(history));

        let page_state = render_page_states(&request.context);
        set("hasPageState", json!(!page_state.is_empty()));
        set("pageState", json!(page_state));

        let filtered = request
            .context
            .filtered_context
            .as_ref()
            .map(|f| {
                let mut parts = vec![f.summary.clone()];
                if !f.relevant_elements.is_empty() {
                    parts.push(format!("Relevant elements: {}", f.relevant_elements.join(", ")));
                }
                if !f.key_insights.is_empty() {
                    parts.push(format!("Key insights: {}", f.key_insights.join("; ")));
                }
                parts.join("\n")
            })
            .unwrap_or_default();
        set("hasFilteredContext", json!(!filtered.is_empty()));
        set("filteredContext", json!(filtered));

        let investigation_history = request
            .context
            .investigation_history
            .as_ref()
            .map(|records| {
                records
                    .iter()
                    .map(|r| {
                        format!(
                            "Step {} {} via {}: {}{}",
                            r.step_index + 1,
                            r.phase.display_name(),
                            r.tool,
                            r.summary,
                            if r.success { "" } else { " (failed)" }
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();
        set("hasInvestigationHistory", json!(!investigation_history.is_empty()));
        set("investigationHistory", json!(investigation_history));

        if let Some(validation) = &request.validation {
            set("hasValidation", json!(true));
            set("validation", json!(render_validation(validation)));
        } else {
            set("hasValidation", json!(false));
        }

        if let Some(completed) = request.completed_step_index {
            set("completedStepNumber", json!(completed + 1));
        }

        if let Some(investigation) = &request.investigation {
            set("phaseName", json!(investigation.phase.display_name()));
            set("investigation", json!(render_investigation(investigation)?));
        }

        let memory = request
            .working_memory
            .as_ref()
            .filter(|m| !m.is_empty())
            .map(render_working_memory)
            .unwrap_or_default();
        set("hasWorkingMemory", json!(!memory.is_empty()));
        set("workingMemory", json!(memory));

        let custom = request
            .custom_instructions
            .map(str::trim)
            .unwrap_or_default();
        set("hasCustomInstructions", json!(!custom.is_empty()));
        set("customInstructions", json!(custom));

        let schema = serde_json::to_string_pretty(&request.schema.schema).map_err(|e| {
            PromptError::template_rendering_failed("Failed to serialize response schema")
                .with_source(e.into())
        })?;
        set("schema", json!(schema));

        let examples = match &request.examples {
            Some(section) if !section.examples.is_empty() => render_examples(section)?,
            _ => String::new(),
        };
        set("hasExamples", json!(!examples.is_empty()));
        set("examples", json!(examples));

        // Substituted values are not rescanned, so the footer is rendered first
        let footer = self.engine.render(response_footer(), &vars);
        vars.insert("footer".to_string(), json!(footer));

        Ok(vars)
    }
}

fn decision_condition(decision: DecisionAction) -> &'static str {
    match decision {
        DecisionAction::Proceed => "the step's goal is met and the workflow can continue",
        DecisionAction::Retry => "the step failed for a transient reason and another attempt is likely to work",
        DecisionAction::Investigate => "the page is not understood well enough to act reliably",
        DecisionAction::Abort => "the step cannot be completed, for example the page or data is missing",
    }
}

fn to_json<T: serde::Serialize>(value: &T, what: &str) -> Result<String> {
    serde_json::to_string(value).map_err(|e| {
        PromptError::template_rendering_failed(format!("Failed to serialize {} section", what))
            .with_source(e.into())
    })
}

fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|i| format!("- {}", i))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_instructions(section: &InstructionSection) -> String {
    let mut parts = vec![
        section.main_instruction.clone(),
        section.step_guidance.clone(),
        format!("Decisions:\n{}", section.decision_framework),
        format!("Guidelines:\n{}", bullets(&section.action_guidelines)),
    ];
    if let Some(requirements) = &section.validation_requirements {
        parts.push(format!("Validation:\n{}", bullets(requirements)));
    }
    if let Some(guidance) = &section.investigation_guidance {
        parts.push(format!("Investigation:\n{}", bullets(guidance)));
    }
    parts.join("\n\n")
}

fn render_page_states(context: &ContextSection) -> String {
    let states = &context.page_states;
    let mut parts = Vec::new();
    if let Some(dom) = &states.current_dom {
        parts.push(dom.clone());
    }
    if let Some(previous) = &states.previous_dom {
        parts.push(format!("PREVIOUS PAGE STATE:\n{}", previous));
    }
    parts.extend(states.omissions.iter().map(|o| format!("[{}]", o)));
    parts.join("\n\n")
}

fn render_validation(section: &ValidationSection) -> String {
    let criteria: Vec<String> = section
        .validation_criteria
        .iter()
        .map(|c| format!("{} ({:.0}%): {}", c.name, c.weight * 100.0, c.description))
        .collect();
    let rules: Vec<String> = section
        .decision_framework
        .iter()
        .map(|r| format!("{} when {}", r.decision, r.condition))
        .collect();

    format!(
        "Expected outcome of step {}: {}\nCriteria:\n{}\nSuccess indicators:\n{}\nFailure indicators:\n{}\nDecide:\n{}",
        section.last_step_index + 1,
        section.expected_outcome,
        bullets(&criteria),
        bullets(&section.success_indicators),
        bullets(&section.failure_indicators),
        bullets(&rules)
    )
}

fn render_investigation(section: &InvestigationSection) -> Result<String> {
    let mut tools = Vec::new();
    for tool in &section.available_tools {
        tools.push(format!(
            "{}. {}: {} parameters {}",
            tool.priority,
            tool.name,
            tool.description,
            to_json(&tool.parameters, "tool parameters")?
        ));
    }

    let mut parts = vec![
        format!("Tools:\n{}", tools.join("\n")),
        format!("Strategy: {}", section.strategy.reasoning),
        format!("Objectives:\n{}", bullets(&section.phase_guidance.objectives)),
        format!("Questions:\n{}", bullets(&section.investigation_questions)),
        format!("Expected outputs:\n{}", bullets(&section.expected_outputs)),
        format!("Avoid:\n{}", bullets(&section.phase_guidance.pitfalls)),
        format!(
            "Context management:\n{}",
            bullets(
                &section
                    .context_management
                    .overflow_prevention
                    .iter()
                    .chain(section.context_management.summarization_rules.iter())
                    .chain(section.context_management.element_bookkeeping.iter())
                    .cloned()
                    .collect::<Vec<_>>()
            )
        ),
    ];
    if let Some(previous) = &section.previous_context {
        parts.push(format!("Earlier findings:\n{}", previous));
    }
    if let Some(count) = section.elements_discovered {
        parts.push(format!("Elements discovered so far: {}", count));
    }
    Ok(parts.join("\n\n"))
}

fn render_working_memory(memory: &WorkingMemorySection) -> String {
    let mut parts = Vec::new();
    if !memory.known_elements.is_empty() {
        let elements: Vec<String> = memory
            .known_elements
            .iter()
            .map(|e| format!("{} ({}, reliability {:.2})", e.selector, e.element_type, e.reliability))
            .collect();
        parts.push(format!("Known elements:\n{}", bullets(&elements)));
    }
    if !memory.extracted_variables.is_empty() {
        let variables: Vec<String> = memory
            .extracted_variables
            .iter()
            .map(|v| format!("{} = {}", v.name, v.value))
            .collect();
        parts.push(format!("Variables:\n{}", bullets(&variables)));
    }
    if !memory.successful_patterns.is_empty() {
        parts.push(format!("Worked before:\n{}", bullets(&memory.successful_patterns)));
    }
    if !memory.failure_patterns.is_empty() {
        parts.push(format!("Failed before:\n{}", bullets(&memory.failure_patterns)));
    }
    parts.join("\n")
}

fn render_examples(section: &ExamplesSection) -> Result<String> {
    let mut rendered = Vec::new();
    for example in &section.examples {
        let response = serde_json::to_string_pretty(&example.response).map_err(|e| {
            PromptError::template_rendering_failed("Failed to serialize prompt example")
                .with_source(e.into())
        })?;
        rendered.push(format!("{}:\n{}", example.description, response));
    }
    Ok(rendered.join("\n\n"))
}

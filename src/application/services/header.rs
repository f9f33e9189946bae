//! Header resolution
//!
//! First match wins: message, selection binding, generic label, roll-up
//! child, covered aspects (concept label, typed member text, structured
//! value text), then the parent when a role was requested.

use tracing::{instrument, trace};

use crate::application::services::{EvalRequest, RenderPass};
use crate::application::{EvalResultExt, Recovery};
use crate::domain::{DimensionMember, DomainError, EvalContext, NodeId, NodeKind, QName, Value};
use crate::infrastructure::traits::MessageKind;

#[derive(Debug, Clone, Copy)]
pub struct HeaderRequest<'r> {
    /// Label role; `None` is the standard role and enables messages.
    pub role: Option<&'r str>,
    /// Overrides the pass language.
    pub lang: Option<&'r str>,
    /// Evaluate message expressions instead of returning raw text.
    pub evaluate: bool,
    pub return_gen_label: bool,
    /// With `evaluate`, return the message format string itself.
    pub return_message_format: bool,
}

impl Default for HeaderRequest<'_> {
    fn default() -> Self {
        Self {
            role: None,
            lang: None,
            evaluate: true,
            return_gen_label: true,
            return_message_format: false,
        }
    }
}

impl<'r> HeaderRequest<'r> {
    pub fn with_role(mut self, role: &'r str) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_lang(mut self, lang: &'r str) -> Self {
        self.lang = Some(lang);
        self
    }

    pub fn unevaluated(mut self) -> Self {
        self.evaluate = false;
        self
    }
}

impl<'a> RenderPass<'a> {
    #[instrument(level = "debug", skip(self, ctx, request))]
    pub fn header(&self, ctx: &mut EvalContext, node: NodeId, request: HeaderRequest<'_>) -> Result<Option<String>, DomainError> {
        let owner = self.tree.node(node)?;
        let active = self.tree.node(self.tree.active(node))?;
        let def = self.model.node(active.definition)?;
        let lang = request.lang.or(self.options.lang.as_deref());
        let labels = self.services.labels.as_ref();

        if request.role.is_none() {
            let kind = if active.selection_binding {
                MessageKind::SelectionMessage
            } else {
                MessageKind::Message
            };
            if let Some(message) = labels.message(&def.id, kind, lang) {
                if !request.evaluate || request.return_message_format {
                    return Ok(Some(message.text.clone()));
                }
                return Ok(Some(match &message.expression {
                    Some(expr) => {
                        let request = EvalRequest::new(expr, active.definition, "message");
                        self.evaluate(ctx, node, None, request)
                            .recover(Recovery::Text)
                            .map(|v| v.to_string())
                            .unwrap_or_default()
                    }
                    None => message.text.clone(),
                }));
            }
        }

        if active.selection_binding {
            let bound = match &def.kind {
                NodeKind::Selection(s) => active.variables.get(&s.variable),
                _ => None,
            };
            return Ok(Some(bound.map_or_else(|| "selection".to_string(), |v| v.to_string())));
        }

        if request.return_gen_label {
            if let Some(label) = labels.gen_label(&def.id, request.role, lang) {
                return Ok(Some(label));
            }
        }

        if let Some(roll_up) = active.roll_up_child {
            return self.header(ctx, roll_up, request);
        }

        let mut concept: Option<QName> = None;
        for aspect in self.aspects_covered(node)? {
            let value = self.aspect_value(ctx, node, &aspect)?;
            match value {
                Some(Value::QName(q)) if aspect.is_concept_like() => {
                    concept = Some(q);
                    break;
                }
                Some(Value::Member(DimensionMember::Explicit(q))) if aspect.is_concept_like() => concept = Some(q),
                Some(Value::Member(DimensionMember::Typed(text))) if aspect.is_concept_like() => return Ok(Some(text)),
                Some(Value::Structured(s)) if !aspect.is_concept_like() => {
                    let text = if s.text.is_empty() && s.forever {
                        "forever".to_string()
                    } else {
                        s.text
                    };
                    return Ok(Some(text));
                }
                _ => {}
            }
        }
        if let Some(concept) = concept {
            trace!("header: concept {}", concept);
            if let Some(label) = labels.concept_label(&concept, &self.options.label_role, lang) {
                return Ok(Some(label));
            }
        }

        match owner.parent {
            Some(parent) if request.role.is_some() => self.header(ctx, parent, request),
            _ => Ok(None),
        }
    }
}

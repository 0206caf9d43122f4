//! Author classification as an ordered rule list.
//!
//! Rules are evaluated top to bottom and the first hit decides. When nothing
//! matches the message is attributed to the assistant: a wrong Assistant label
//! is less harmful than a wrong User label.

use tracing::debug;

use crate::dom::{Document, NodeId};
use crate::message::Author;
use crate::selector::Matcher;

pub const USER_TAG: &str = "user-query";
pub const ASSISTANT_TAG: &str = "model-response";

const USER_NEEDLES: &[&str] = &["user"];
const ASSISTANT_NEEDLES: &[&str] = &["model", "assistant"];

/// Attributes consulted for the author role, first non-empty wins.
const ROLE_ATTRS: &[&str] = &["data-message-author-role", "data-author", "role"];

#[derive(Debug, Clone)]
pub enum Predicate {
    Tag(&'static str),
    /// First non-empty of `attrs`, lowercased, contains any needle.
    RoleContains {
        attrs: &'static [&'static str],
        needles: &'static [&'static str],
    },
    /// Lowercased class attribute contains any needle.
    ClassContains(&'static [&'static str]),
    /// Some descendant matches.
    Descendant(Matcher),
    /// Nearest inclusive ancestor matching `anchor` satisfies `then`.
    Closest {
        anchor: Matcher,
        then: Box<Predicate>,
    },
}

impl Predicate {
    pub fn holds(&self, doc: &Document, id: NodeId) -> bool {
        let Some(element) = doc.element(id) else {
            return false;
        };
        match self {
            Predicate::Tag(tag) => element.tag == *tag,
            Predicate::RoleContains { attrs, needles } => {
                let role = attrs
                    .iter()
                    .filter_map(|name| element.attr(name))
                    .find(|value| !value.is_empty())
                    .unwrap_or("")
                    .to_lowercase();
                needles.iter().any(|n| role.contains(n))
            }
            Predicate::ClassContains(needles) => {
                let class = element.class_name().to_lowercase();
                needles.iter().any(|n| class.contains(n))
            }
            Predicate::Descendant(matcher) => doc.query_first(id, matcher).is_some(),
            Predicate::Closest { anchor, then } => doc
                .closest(id, anchor)
                .is_some_and(|ancestor| then.holds(doc, ancestor)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub name: &'static str,
    pub predicate: Predicate,
    pub verdict: Author,
}

impl Rule {
    pub fn new(name: &'static str, predicate: Predicate, verdict: Author) -> Self {
        Self {
            name,
            predicate,
            verdict,
        }
    }
}

fn turn_anchor() -> Matcher {
    Matcher::Any(vec![
        Matcher::attr_present("data-message-author-role"),
        Matcher::tag(USER_TAG),
        Matcher::tag(ASSISTANT_TAG),
    ])
}

fn enclosing(then: Predicate) -> Predicate {
    Predicate::Closest {
        anchor: turn_anchor(),
        then: Box::new(then),
    }
}

fn default_rules() -> Vec<Rule> {
    use Author::{Assistant, User};

    vec![
        Rule::new("tag:user", Predicate::Tag(USER_TAG), User),
        Rule::new("tag:assistant", Predicate::Tag(ASSISTANT_TAG), Assistant),
        Rule::new(
            "role:user",
            Predicate::RoleContains {
                attrs: ROLE_ATTRS,
                needles: USER_NEEDLES,
            },
            User,
        ),
        Rule::new(
            "role:assistant",
            Predicate::RoleContains {
                attrs: ROLE_ATTRS,
                needles: ASSISTANT_NEEDLES,
            },
            Assistant,
        ),
        Rule::new(
            "class:user",
            Predicate::ClassContains(&["user-message", "user-query"]),
            User,
        ),
        Rule::new(
            "class:assistant",
            Predicate::ClassContains(&["model-response", "assistant"]),
            Assistant,
        ),
        Rule::new(
            "nested-tag:user",
            Predicate::Descendant(Matcher::tag(USER_TAG)),
            User,
        ),
        Rule::new(
            "nested-tag:assistant",
            Predicate::Descendant(Matcher::tag(ASSISTANT_TAG)),
            Assistant,
        ),
        Rule::new(
            "nested-role:user",
            Predicate::Descendant(Matcher::Any(vec![
                Matcher::attr_contains("data-message-author-role", "user"),
                Matcher::attr_contains("data-author", "user"),
            ])),
            User,
        ),
        Rule::new(
            "nested-role:assistant",
            Predicate::Descendant(Matcher::Any(vec![
                Matcher::attr_contains("data-message-author-role", "model"),
                Matcher::attr_contains("data-author", "model"),
                Matcher::attr_contains("data-author", "assistant"),
            ])),
            Assistant,
        ),
        Rule::new("enclosing-tag:user", enclosing(Predicate::Tag(USER_TAG)), User),
        Rule::new(
            "enclosing-tag:assistant",
            enclosing(Predicate::Tag(ASSISTANT_TAG)),
            Assistant,
        ),
        Rule::new(
            "enclosing-role:user",
            enclosing(Predicate::RoleContains {
                attrs: &["data-message-author-role"],
                needles: USER_NEEDLES,
            }),
            User,
        ),
        Rule::new(
            "enclosing-role:assistant",
            enclosing(Predicate::RoleContains {
                attrs: &["data-message-author-role"],
                needles: ASSISTANT_NEEDLES,
            }),
            Assistant,
        ),
    ]
}

/// Decides who authored a message element.
#[derive(Debug, Clone)]
pub struct AuthorClassifier {
    rules: Vec<Rule>,
    fallback: Author,
}

impl Default for AuthorClassifier {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            fallback: Author::Assistant,
        }
    }
}

impl AuthorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(&self, doc: &Document, id: NodeId) -> Author {
        self.explain(doc, id).0
    }

    /// The verdict and the name of the rule that produced it, `"default"`
    /// when nothing matched.
    pub fn explain(&self, doc: &Document, id: NodeId) -> (Author, &'static str) {
        match self.rules.iter().find(|rule| rule.predicate.holds(doc, id)) {
            Some(rule) => (rule.verdict, rule.name),
            None => {
                debug!(tag = ?doc.tag(id), "no author signal, defaulting to assistant");
                (self.fallback, "default")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Markup;

    fn classify(markup: Markup) -> (Author, &'static str) {
        let doc = Document::from_markup(&markup);
        AuthorClassifier::new().explain(&doc, doc.root())
    }

    #[test]
    fn tags_decide_first() {
        assert_eq!(classify(Markup::el("user-query")).0, Author::User);
        assert_eq!(classify(Markup::el("model-response")).0, Author::Assistant);
    }

    #[test]
    fn outer_tag_beats_nested_signals() {
        let markup = Markup::el("user-query").child(
            Markup::el("div")
                .attr("data-message-author-role", "model")
                .child(Markup::el("model-response")),
        );
        assert_eq!(classify(markup), (Author::User, "tag:user"));
    }

    #[test]
    fn first_non_empty_role_attribute_wins() {
        let markup = Markup::el("div")
            .attr("data-message-author-role", "")
            .attr("data-author", "Model")
            .attr("role", "user");
        assert_eq!(classify(markup), (Author::Assistant, "role:assistant"));
    }

    #[test]
    fn class_and_nested_rules() {
        let by_class = Markup::el("div").attr("class", "User-Message bubble");
        assert_eq!(classify(by_class), (Author::User, "class:user"));

        let nested = Markup::el("div").child(Markup::el("span").attr("data-author", "user-1"));
        assert_eq!(classify(nested), (Author::User, "nested-role:user"));
    }

    #[test]
    fn enclosing_turn_decides_for_inner_nodes() {
        let markup = Markup::el("div")
            .attr("data-message-author-role", "user")
            .child(Markup::el("p").child(Markup::text("hello")));
        let doc = Document::from_markup(&markup);
        let p = doc.query_first(doc.root(), &Matcher::tag("p")).unwrap();
        assert_eq!(
            AuthorClassifier::new().explain(&doc, p),
            (Author::User, "enclosing-role:user")
        );
    }

    #[test]
    fn no_signal_defaults_to_assistant() {
        let markup = Markup::el("div").child(Markup::text("who wrote this?"));
        assert_eq!(classify(markup), (Author::Assistant, "default"));
    }
}

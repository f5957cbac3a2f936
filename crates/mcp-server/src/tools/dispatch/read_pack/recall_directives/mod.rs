mod parse;
mod policy;

pub(super) use parse::{
    parse_recall_literal_directive, parse_recall_question_directives, parse_recall_regex_directive,
};
pub(super) use policy::{build_semantic_query, recall_question_policy, RecallQuestionMode};

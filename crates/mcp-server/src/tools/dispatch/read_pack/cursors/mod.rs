pub(super) mod limits;
mod normalize;
mod types;

pub(crate) use normalize::trimmed_non_empty_str;
pub(super) use normalize::{
    normalize_optional_pattern, normalize_path_prefix_list, normalize_questions, normalize_topics,
    snippet_kind_for_path, trim_chars, trim_utf8_bytes,
};
pub(super) use types::{
    CursorHeader, ReadPackMemoryCursorV1, ReadPackRecallCursorStoredV1, ReadPackRecallCursorV1,
};

mod context_doc;
mod entrypoint_score;
mod meta;
mod section_render;
mod truncate;

pub(super) use context_doc::render_read_pack_context_doc;
pub(super) use entrypoint_score::entrypoint_candidate_score;
pub(super) use meta::apply_meta_to_sections;
pub(super) use truncate::truncate_to_chars;

pub(in crate::tools::dispatch::read_pack) const MAX_RECALL_QUESTIONS: usize = 12;
pub(in crate::tools::dispatch::read_pack) const MAX_RECALL_QUESTION_CHARS: usize = 220;
pub(in crate::tools::dispatch::read_pack) const MAX_RECALL_QUESTION_BYTES: usize = 384;
pub(in crate::tools::dispatch::read_pack) const MAX_RECALL_TOPICS: usize = 8;
pub(in crate::tools::dispatch::read_pack) const MAX_RECALL_TOPIC_CHARS: usize = 80;
pub(in crate::tools::dispatch::read_pack) const MAX_RECALL_TOPIC_BYTES: usize = 192;
pub(in crate::tools::dispatch::read_pack) const DEFAULT_RECALL_SNIPPETS_PER_QUESTION: usize = 3;
pub(in crate::tools::dispatch::read_pack) const MAX_RECALL_SNIPPETS_PER_QUESTION: usize = 5;

pub(in crate::tools::dispatch::read_pack) const MAX_RECALL_FILTER_PATHS: usize = 16;
pub(in crate::tools::dispatch::read_pack) const MAX_RECALL_FILTER_PATH_BYTES: usize = 120;

//! Identifier → directory sharding.
//!
//! An identifier is cut into two-character chunks, left to right. A trailing
//! single character is padded with `'0'`; fewer than three chunks are
//! front-padded with `"00"`. The full identifier is always appended as the
//! leaf, so chunk collisions only affect fan-out, never addressing.
//!
//! ```text
//! "123456"  -> assets/12/34/56/123456
//! "1234567" -> assets/12/34/56/70/1234567
//! "ab"      -> assets/00/00/ab/ab
//! ```

/// Root segment used when none is configured
pub const DEFAULT_ROOT_SEGMENT: &str = "assets";

const CHUNK_CHARS: usize = 2;
const MIN_CHUNKS: usize = 3;
const CHUNK_PAD: char = '0';
const LEVEL_PAD: &str = "00";

/// Strategy for mapping an identifier to its storage directory
pub trait ShardStrategy: Send + Sync {
    /// Ordered path segments, root first and the identifier's leaf last
    ///
    /// Segments are not sanitized here; the layout refuses any that is not a
    /// plain directory name before touching the filesystem.
    fn segments(&self, root: &str, id: &str) -> Vec<String>;
}

/// Default strategy: two-character chunks, three-level floor, identifier leaf
#[derive(Debug, Clone, Default)]
pub struct DefaultShardStrategy;

impl ShardStrategy for DefaultShardStrategy {
    fn segments(&self, root: &str, id: &str) -> Vec<String> {
        let chars: Vec<char> = id.chars().collect();
        let mut chunks: Vec<String> = chars
            .chunks(CHUNK_CHARS)
            .map(|chunk| {
                let mut segment: String = chunk.iter().collect();
                if chunk.len() < CHUNK_CHARS {
                    segment.push(CHUNK_PAD);
                }
                segment
            })
            .collect();

        // Empty identifiers get no padding; callers never pass one.
        if !chunks.is_empty() && chunks.len() < MIN_CHUNKS {
            let missing = MIN_CHUNKS - chunks.len();
            chunks.splice(0..0, std::iter::repeat(LEVEL_PAD.to_string()).take(missing));
        }

        let mut segments = Vec::with_capacity(chunks.len() + 2);
        segments.push(root.to_string());
        segments.extend(chunks);
        segments.push(id.to_string());
        segments
    }
}

/// Shard an identifier under [`DEFAULT_ROOT_SEGMENT`]
pub fn shard_path(id: &str) -> Vec<String> {
    DefaultShardStrategy.segments(DEFAULT_ROOT_SEGMENT, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_length_identifier() {
        assert_eq!(shard_path("123456"), vec!["assets", "12", "34", "56", "123456"]);
    }

    #[test]
    fn odd_length_identifier_pads_last_chunk() {
        assert_eq!(
            shard_path("1234567"),
            vec!["assets", "12", "34", "56", "70", "1234567"]
        );
    }

    #[test]
    fn short_identifier_is_front_padded() {
        assert_eq!(shard_path("ab"), vec!["assets", "00", "00", "ab", "ab"]);
        assert_eq!(shard_path("a"), vec!["assets", "00", "00", "a0", "a"]);
        assert_eq!(shard_path("abc"), vec!["assets", "00", "ab", "c0", "abc"]);
    }

    #[test]
    fn short_identifiers_have_exactly_three_levels() {
        for id in ["1", "12", "123", "1234", "12345"] {
            let segments = shard_path(id);
            assert_eq!(segments.len(), 5, "{id}");
            assert_eq!(segments.last().map(String::as_str), Some(id));
        }
    }

    #[test]
    fn sharding_is_deterministic_and_keeps_leaf_verbatim() {
        for id in ["x", "SKU-001", "äöü", "a.b c", "00000000000"] {
            let first = shard_path(id);
            assert_eq!(first, shard_path(id));
            assert_eq!(first.last().map(String::as_str), Some(id));
            assert_eq!(first[0], DEFAULT_ROOT_SEGMENT);
        }
    }

    #[test]
    fn non_ascii_chunks_by_character() {
        assert_eq!(shard_path("äöü"), vec!["assets", "00", "äö", "ü0", "äöü"]);
    }

    #[test]
    fn dotted_identifiers_shard_verbatim() {
        assert_eq!(shard_path("......"), vec!["assets", "..", "..", "..", "......"]);
        assert_eq!(shard_path("12..34"), vec!["assets", "12", "..", "34", "12..34"]);
    }
}

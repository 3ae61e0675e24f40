//! Word-window chunking and stop-word cleaning.

use std::collections::HashSet;
use std::sync::OnceLock;

use crate::error::{RagError, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// English stop-word list dropped by [`clean`].
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all",
    "almost", "alone", "along", "already", "also", "although", "always", "am", "among",
    "amongst", "amoungst", "amount", "an", "and", "another", "any", "anyhow", "anyone",
    "anything", "anyway", "anywhere", "are", "around", "as", "at", "back", "be", "became",
    "because", "become", "becomes", "becoming", "been", "before", "beforehand", "behind",
    "being", "below", "beside", "besides", "between", "beyond", "bill", "both", "bottom",
    "but", "by", "call", "can", "cannot", "cant", "co", "con", "could", "couldnt", "cry",
    "de", "describe", "detail", "do", "done", "down", "due", "during", "each", "eg",
    "eight", "either", "eleven", "else", "elsewhere", "empty", "enough", "etc", "even",
    "ever", "every", "everyone", "everything", "everywhere", "except", "few", "fifteen",
    "fifty", "fill", "find", "fire", "first", "five", "for", "former", "formerly", "forty",
    "found", "four", "from", "front", "full", "further", "get", "give", "go", "had", "has",
    "hasnt", "have", "he", "hence", "her", "here", "hereafter", "hereby", "herein",
    "hereupon", "hers", "herself", "him", "himself", "his", "how", "however", "hundred",
    "i", "ie", "if", "in", "inc", "indeed", "interest", "into", "is", "it", "its", "itself",
    "keep", "last", "latter", "latterly", "least", "less", "ltd", "made", "many", "may",
    "me", "meanwhile", "might", "mill", "mine", "more", "moreover", "most", "mostly",
    "move", "much", "must", "my", "myself", "name", "namely", "neither", "never",
    "nevertheless", "next", "nine", "no", "nobody", "none", "noone", "nor", "not",
    "nothing", "now", "nowhere", "of", "off", "often", "on", "once", "one", "only", "onto",
    "or", "other", "others", "otherwise", "our", "ours", "ourselves", "out", "over", "own",
    "part", "per", "perhaps", "please", "put", "rather", "re", "same", "see", "seem",
    "seemed", "seeming", "seems", "serious", "several", "she", "should", "show", "side",
    "since", "sincere", "six", "sixty", "so", "some", "somehow", "someone", "something",
    "sometime", "sometimes", "somewhere", "still", "such", "system", "take", "ten", "than",
    "that", "the", "their", "them", "themselves", "then", "thence", "there", "thereafter",
    "thereby", "therefore", "therein", "thereupon", "these", "they", "thick", "thin",
    "third", "this", "those", "though", "three", "through", "throughout", "thru", "thus",
    "to", "together", "too", "top", "toward", "towards", "twelve", "twenty", "two", "un",
    "under", "until", "up", "upon", "us", "very", "via", "was", "we", "well", "were",
    "what", "whatever", "when", "whence", "whenever", "where", "whereafter", "whereas",
    "whereby", "wherein", "whereupon", "wherever", "whether", "which", "while", "whither",
    "who", "whoever", "whole", "whom", "whose", "why", "will", "with", "within", "without",
    "would", "yet", "you", "your", "yours", "yourself", "yourselves",
];

fn stop_words() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOP_WORDS.iter().copied().collect())
}

/// Word-count window configuration. `overlap < size` is enforced on
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl Chunker {
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if overlap >= size {
            return Err(RagError::InvalidChunkConfig { size, overlap });
        }
        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Splits `text` into word-aligned windows of at most `size` words, each
    /// starting `size - overlap` words after the previous one.
    ///
    /// Stops after the window that reaches the last word, so no trailing
    /// chunk consists only of overlap.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let step = self.size - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < words.len() {
            let end = (start + self.size).min(words.len());
            chunks.push(words[start..end].join(" "));
            if end == words.len() {
                break;
            }
            start += step;
        }
        chunks
    }
}

pub fn chunk(text: &str, size: usize, overlap: usize) -> Result<Vec<String>> {
    Ok(Chunker::new(size, overlap)?.chunk(text))
}

/// Drops stop-words (case-insensitively) and rejoins with single spaces.
pub fn clean(chunk: &str) -> String {
    let stop = stop_words();
    chunk
        .split_whitespace()
        .filter(|word| !stop.contains(word.to_lowercase().as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collapses every whitespace run, newlines included, into one space.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn default_windows_over_1200_words() {
        let text = numbered_words(1200);
        let chunks = Chunker::default().chunk(&text);
        assert_eq!(chunks.len(), 3);

        let bounds: Vec<(String, String, usize)> = chunks
            .iter()
            .map(|c| {
                let words: Vec<&str> = c.split(' ').collect();
                (words[0].to_string(), words[words.len() - 1].to_string(), words.len())
            })
            .collect();
        assert_eq!(bounds[0], ("w0".into(), "w499".into(), 500));
        assert_eq!(bounds[1], ("w450".into(), "w949".into(), 500));
        assert_eq!(bounds[2], ("w900".into(), "w1199".into(), 300));
    }

    #[test]
    fn chunks_cover_every_word_in_order() {
        let text = numbered_words(37);
        let chunker = Chunker::new(10, 3).unwrap();
        let chunks = chunker.chunk(&text);

        let mut rebuilt: Vec<String> = Vec::new();
        for (i, c) in chunks.iter().enumerate() {
            let words = c.split(' ').map(str::to_string);
            if i == 0 {
                rebuilt.extend(words);
            } else {
                rebuilt.extend(words.skip(chunker.overlap()));
            }
        }
        assert_eq!(rebuilt.join(" "), text);
    }

    #[test]
    fn short_input_with_small_windows() {
        let chunks = chunk("A B C D E", 3, 1).unwrap();
        assert_eq!(chunks, vec!["A B C", "C D E"]);
    }

    #[test]
    fn overlap_not_below_size_is_rejected() {
        assert!(matches!(
            chunk("a b c", 5, 5),
            Err(RagError::InvalidChunkConfig { size: 5, overlap: 5 })
        ));
        assert!(Chunker::new(0, 0).is_err());
        assert!(Chunker::new(3, 7).is_err());
    }

    #[test]
    fn blank_text_has_no_chunks() {
        assert!(Chunker::default().chunk("  \n\t ").is_empty());
    }

    #[test]
    fn clean_drops_stop_words_ignoring_case() {
        assert_eq!(clean("The  quick FOX is  in the Garden"), "quick FOX Garden");
    }

    #[test]
    fn clean_is_idempotent() {
        let once = clean("Whereas the tractor   and THE barn were red");
        assert_eq!(clean(&once), once);
    }

    #[test]
    fn all_stop_words_clean_to_empty() {
        assert_eq!(clean("the of and To"), "");
    }

    #[test]
    fn whitespace_is_normalized() {
        assert_eq!(normalize_whitespace("  a\n\nb\r\n c\t"), "a b c");
    }
}

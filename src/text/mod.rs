mod keywords;
mod similarity;
mod vocabulary;

pub use keywords::KeywordExtractor;
pub use similarity::{LevenshteinScorer, SimilarityScorer};
pub use vocabulary::Vocabulary;

use lazy_static::lazy_static;
use std::collections::HashSet;

/// Characters stripped from both ends of every whitespace-delimited unit.
const EDGE_PUNCTUATION: &[char] = &['.', ',', '!', '?', ';', '"', '\'', '(', ')', '[', ']', '{', '}'];

lazy_static! {
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "i","me","my","myself","we","our","ours","ourselves","you","you're","you've","you'll","you'd",
            "your","yours","yourself","yourselves","he","him","his","himself","she","she's","her","hers","herself",
            "it","it's","its","itself","they","them","their","theirs","themselves","what","which","who","whom",
            "this","that","that'll","these","those","am","is","are","was","were","be","been","being",
            "have","has","had","having","do","does","did","doing","a","an","the","and","but","if","or",
            "because","as","until","while","of","at","by","for","with","about","against","between","into",
            "through","during","before","after","above","below","to","from","up","down","in","out","on","off",
            "over","under","again","further","then","once","here","there","when","where","why","how",
            "all","any","both","each","few","more","most","other","some","such","no","nor","not","only",
            "own","same","so","than","too","very","s","t","can","will","just","don","don't","should",
            "should've","now","d","ll","m","o","re","ve","y","ain","aren","aren't","couldn","couldn't",
            "didn","didn't","doesn","doesn't","hadn","hadn't","hasn","hasn't","haven","haven't","isn","isn't",
            "ma","mightn","mightn't","mustn","mustn't","needn","needn't","shan","shan't","shouldn","shouldn't",
            "wasn","wasn't","weren","weren't","won","won't","wouldn","wouldn't"
        ];
        words.iter().copied().collect()
    };
}

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(token)
}

/// Tokenize text into normalized terms: lowercase, split on whitespace, strip
/// edge punctuation, drop empties and English stop words.
///
/// Source order is preserved and nothing is deduplicated, so the index of a
/// term in the returned vector is its positional offset within the field.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|unit| unit.trim_matches(EDGE_PUNCTUATION))
        .filter(|unit| !unit.is_empty() && !is_stopword(unit))
        .map(str::to_string)
        .collect()
}

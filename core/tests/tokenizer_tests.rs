use search_core::tokenizer::{is_stopword, tokenize};

#[test]
fn it_lowercases_and_strips_edge_punctuation() {
    let words = tokenize("Versatile SNEAKERS! \"Italian\" (leather) [new] {sale}; ok?");
    assert_eq!(words, vec!["versatile", "sneakers", "italian", "leather", "new", "sale", "ok"]);
}

#[test]
fn it_filters_stopwords() {
    let words = tokenize("The quick brown fox and the lazy dog");
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
    assert_eq!(words, vec!["quick", "brown", "fox", "lazy", "dog"]);
}

#[test]
fn it_keeps_duplicates_in_source_order() {
    assert_eq!(tokenize("red shoe red"), vec!["red", "shoe", "red"]);
}

#[test]
fn stopword_only_and_blank_text_yield_nothing() {
    assert!(tokenize("").is_empty());
    assert!(tokenize("   \t\n").is_empty());
    assert!(tokenize("with the and of").is_empty());
    assert!(tokenize("... !!! ()").is_empty());
}

#[test]
fn contractions_are_stopwords() {
    assert!(is_stopword("don't"));
    assert!(tokenize("Don't").is_empty());
    assert!(!is_stopword("sneakers"));
}

use serde_json::Value;
use url::Url;

const NO_ID: &str = "No id";
const NO_VARIANT: &str = "No variant";

/// Product id and variant for a crawled product URL such as
/// `https://shop.example/product/17?variant=blue`.
///
/// The id is the path segment following a leading `product` segment, as a
/// number when it is all digits. The variant is the first non-empty
/// `variant` query value.
pub fn product_identity(raw: &str) -> (Value, String) {
    let Ok(url) = Url::parse(raw) else {
        return (Value::String(NO_ID.into()), NO_VARIANT.into());
    };

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();
    let id = match segments.as_slice() {
        ["product", id, ..] => match id.parse::<u64>() {
            Ok(n) if id.chars().all(|c| c.is_ascii_digit()) => Value::from(n),
            _ => Value::String((*id).to_string()),
        },
        _ => Value::String(NO_ID.into()),
    };

    let variant = url
        .query_pairs()
        .find(|(k, v)| k == "variant" && !v.is_empty())
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| NO_VARIANT.into());

    (id, variant)
}

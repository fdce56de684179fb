// ABOUTME: Human-readable dumps of serializable values for troubleshooting
// ABOUTME: Tab-indented pretty JSON, used by the CLI to show bundle contents

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

/// Render `value` as tab-indented JSON.
pub fn dump<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let mut out = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"\t"));
    value.serialize(&mut serializer)?;
    // serde_json only ever writes valid UTF-8
    Ok(String::from_utf8_lossy(&out).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::CodeBundle;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_dump_bundle_view() {
        let mut bundle = CodeBundle::new();
        bundle.insert("main.py", "print(1+1)").unwrap();

        let text = dump(&bundle.text_view()).unwrap();
        assert_eq!(
            text,
            "{\n\t\"harness\": \"timer.sh\",\n\t\"files\": {\n\t\t\"main.py\": \"print(1+1)\"\n\t}\n}"
        );
    }
}

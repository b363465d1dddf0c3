//! regwasm translator as a WASM module for browser environments.
//!
//! This crate exposes the translation pipeline via `wasm-bindgen`, suitable
//! for running in a browser Web Worker.
//!
//! # Usage (JavaScript)
//!
//! ```js
//! import init, { compile, dump } from 'regwasm-wasm';
//!
//! await init();
//!
//! const bytes = new Uint8Array(await (await fetch('app.wasm')).arrayBuffer());
//! const result = JSON.parse(compile(bytes, '{"pointer_width":"p32"}'));
//! // { success: true, module: { ... }, error: null, fingerprint: "9f86d0…" }
//! console.log(dump(bytes));
//! ```

use wasm_bindgen::prelude::*;

use regwasm_types::{CompileOptions, CompileResult};

/// Translate a binary module to register bytecode.
///
/// `options_json` holds a `CompileOptions` object; missing fields and an
/// empty string take the defaults. Returns a JSON string containing a
/// `CompileOutput`:
/// ```json
/// {
///   "success": true,
///   "module": { "module": { ... }, "headers": [ ... ], "functions": [ ... ] },
///   "error": null,
///   "fingerprint": "9f86d081884c7d65…"
/// }
/// ```
///
/// On failure, `success` is `false`, `module` is `null`, and `error` holds
/// the structured error (`kind`, `category`, `message`, `offset`,
/// `function`).
#[wasm_bindgen]
pub fn compile(bytes: &[u8], options_json: &str) -> String {
    let options = match parse_options(options_json) {
        Ok(options) => options,
        Err(message) => return failure(bytes, &message),
    };
    let result = regwasm_compiler::compile_to_result(bytes, &options);
    serde_json::to_string(&result)
        .unwrap_or_else(|e| failure(bytes, &format!("Serialization error: {e}")))
}

/// Translate a binary module with options given as a JS object.
///
/// Returns the `CompileOutput` as a JS object rather than a JSON string.
/// `undefined` and `null` options take the defaults.
#[wasm_bindgen]
pub fn compile_with_options(bytes: &[u8], options: JsValue) -> Result<JsValue, JsValue> {
    let options: CompileOptions = if options.is_undefined() || options.is_null() {
        CompileOptions::default()
    } else {
        serde_wasm_bindgen::from_value(options)?
    };
    let result = regwasm_compiler::compile_to_result(bytes, &options);
    Ok(serde_wasm_bindgen::to_value(&result)?)
}

/// Render the generated bytecode of every function as a text listing.
///
/// Throws the compile error's message if translation fails.
#[wasm_bindgen]
pub fn dump(bytes: &[u8]) -> Result<String, JsValue> {
    listing(bytes, &CompileOptions::default()).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Return the translator version string.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn parse_options(json: &str) -> Result<CompileOptions, String> {
    if json.trim().is_empty() {
        return Ok(CompileOptions::default());
    }
    serde_json::from_str(json).map_err(|e| format!("invalid options: {e}"))
}

fn listing(bytes: &[u8], options: &CompileOptions) -> CompileResult<String> {
    Ok(regwasm_compiler::compile(bytes, options)?.listing())
}

/// A failure result for errors raised outside the pipeline.
fn failure(bytes: &[u8], message: &str) -> String {
    serde_json::json!({
        "success": false,
        "module": null,
        "error": { "message": message },
        "fingerprint": regwasm_compiler::fingerprint(bytes),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `(func (export "one") (result i32) i32.const 1)`
    const ONE: &[u8] = &[
        0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, // header
        0x01, 0x05, 0x01, 0x60, 0x00, 0x01, 0x7f, // type
        0x03, 0x02, 0x01, 0x00, // function
        0x07, 0x07, 0x01, 0x03, b'o', b'n', b'e', 0x00, 0x00, // export
        0x0a, 0x06, 0x01, 0x04, 0x00, 0x41, 0x01, 0x0b, // code
    ];

    fn parse(json: &str) -> serde_json::Value {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn compile_returns_json_result() {
        let out = parse(&compile(ONE, ""));
        assert_eq!(out["success"], true);
        assert!(out["error"].is_null());
        assert_eq!(out["module"]["headers"][0]["name"], "one[0]");
        assert_eq!(out["fingerprint"], regwasm_compiler::fingerprint(ONE).as_str());
    }

    #[test]
    fn compile_honours_options() {
        let out = parse(&compile(ONE, r#"{ "pointer_width": "p32" }"#));
        assert_eq!(out["success"], true);
    }

    #[test]
    fn bad_options_are_reported_as_failure() {
        let out = parse(&compile(ONE, r#"{ "pointer_width": "p16" }"#));
        assert_eq!(out["success"], false);
        assert!(out["module"].is_null());
        assert!(out["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("invalid options"));
    }

    #[test]
    fn compile_errors_are_structured() {
        let out = parse(&compile(&ONE[..8], ""));
        assert_eq!(out["success"], true, "an empty module translates");

        let mut truncated = ONE.to_vec();
        truncated.truncate(ONE.len() - 1);
        let out = parse(&compile(&truncated, ""));
        assert_eq!(out["success"], false);
        assert_eq!(out["error"]["category"], "structure");
    }

    #[test]
    fn listing_names_every_function() {
        let text = listing(ONE, &CompileOptions::default()).unwrap();
        assert!(text.contains("one[0]"), "{text}");
    }

    #[test]
    fn version_matches_package() {
        assert_eq!(version(), "0.1.0");
    }
}

//! `String.prototype.normalize`

use super::{arg, method};
use crate::context::Context;
use crate::conv;
use crate::value::Value;
use unicode_normalization::UnicodeNormalization;

pub(super) fn install(ctx: &mut Context) {
    let proto = ctx.intrinsics.string_proto.clone();
    method(ctx, &proto, "normalize", |ctx, this, args| {
        if this.is_nullish() {
            return Err(ctx.type_error("String.prototype.normalize called on null or undefined"));
        }
        let text = conv::to_string(this);
        let form = match arg(args, 0) {
            Value::Undefined => "NFC".to_string(),
            other => conv::to_string(&other),
        };
        match normalize(&text, &form) {
            Some(out) => Ok(Value::from(out)),
            None => Err(ctx.range_error("The normalization form should be one of NFC, NFD, NFKC, NFKD.")),
        }
    });
}

fn normalize(text: &str, form: &str) -> Option<String> {
    Some(match form {
        "NFC" => text.nfc().collect(),
        "NFD" => text.nfd().collect(),
        "NFKC" => text.nfkc().collect(),
        "NFKD" => text.nfkd().collect(),
        _ => return None,
    })
}

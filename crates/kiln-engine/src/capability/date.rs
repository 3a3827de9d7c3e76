//! `Date` with UTC calendar arithmetic

use super::{constructor, method};
use crate::context::Context;
use crate::conv;
use crate::value::{ObjectKind, ScriptResult, Value};
use std::time::{SystemTime, UNIX_EPOCH};

const MS_PER_DAY: f64 = 86_400_000.0;
const MAX_TIME: f64 = 8.64e15;

pub(super) fn install(ctx: &mut Context) {
    let proto = ctx.intrinsics.date_proto.clone();
    let date = constructor(ctx, "Date", &proto, |ctx, _, args| {
        let time = match args.first() {
            None => now(),
            Some(Value::Number(n)) => time_clip(*n),
            Some(Value::Object(o)) => match o.borrow().kind {
                ObjectKind::Date(t) => t,
                _ => f64::NAN,
            },
            Some(_) => f64::NAN,
        };
        let proto = ctx.intrinsics.date_proto.clone();
        Ok(Value::Object(ctx.alloc(ObjectKind::Date(time), Some(proto))))
    });
    method(ctx, &date, "now", |_, _, _| Ok(Value::Number(now())));

    method(ctx, &proto, "getTime", |ctx, this, _| Ok(Value::Number(this_time(ctx, this)?)));
    method(ctx, &proto, "valueOf", |ctx, this, _| Ok(Value::Number(this_time(ctx, this)?)));
    method(ctx, &proto, "toISOString", |ctx, this, _| {
        let time = this_time(ctx, this)?;
        match iso_string(time) {
            Some(s) => Ok(Value::from(s)),
            None => Err(ctx.range_error("Invalid time value")),
        }
    });
    method(ctx, &proto, "toString", |ctx, this, _| {
        let time = this_time(ctx, this)?;
        Ok(Value::from(iso_string(time).unwrap_or_else(|| "Invalid Date".to_string())))
    });
    method(ctx, &proto, "getFullYear", |ctx, this, _| {
        Ok(Value::Number(field(this_time(ctx, this)?, |(y, _, _)| y as f64)))
    });
    method(ctx, &proto, "getMonth", |ctx, this, _| {
        Ok(Value::Number(field(this_time(ctx, this)?, |(_, m, _)| (m - 1) as f64)))
    });
    method(ctx, &proto, "getDate", |ctx, this, _| {
        Ok(Value::Number(field(this_time(ctx, this)?, |(_, _, d)| d as f64)))
    });
}

fn this_time(ctx: &mut Context, this: &Value) -> ScriptResult<f64> {
    if let Value::Object(o) = this {
        if let ObjectKind::Date(t) = o.borrow().kind {
            return Ok(t);
        }
    }
    Err(ctx.type_error(format!("{} is not a Date", conv::to_string(this))))
}

fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as f64)
        .unwrap_or(0.0)
}

fn time_clip(t: f64) -> f64 {
    if !t.is_finite() || t.abs() > MAX_TIME {
        f64::NAN
    } else {
        t.trunc() + 0.0
    }
}

fn field(time: f64, pick: impl Fn((i64, u32, u32)) -> f64) -> f64 {
    if time.is_nan() {
        return f64::NAN;
    }
    let days = (time / MS_PER_DAY).floor() as i64;
    pick(civil_from_days(days))
}

/// Proleptic Gregorian (year, month 1-12, day 1-31) of a day count since 1970-01-01
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// `YYYY-MM-DDTHH:mm:ss.sssZ`, or `None` for an invalid time value
pub(crate) fn iso_string(time: f64) -> Option<String> {
    if !time.is_finite() || time.abs() > MAX_TIME {
        return None;
    }
    let ms = time as i64;
    let days = ms.div_euclid(86_400_000);
    let in_day = ms.rem_euclid(86_400_000);
    let (year, month, day) = civil_from_days(days);
    let year = if (0..=9999).contains(&year) {
        format!("{:04}", year)
    } else if year < 0 {
        format!("-{:06}", -year)
    } else {
        format!("+{:06}", year)
    };
    Some(format!(
        "{}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        year,
        month,
        day,
        in_day / 3_600_000,
        in_day / 60_000 % 60,
        in_day / 1000 % 60,
        in_day % 1000
    ))
}

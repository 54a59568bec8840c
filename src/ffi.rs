//! FFI bindings for ratio-lens
//!
//! This module provides C-compatible functions for calling ratio-lens from
//! other languages. Strings are null-terminated; any string returned by this
//! module is heap-allocated and must be released with `ratio_lens_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::path::PathBuf;
use std::ptr;

use crate::config::RatioLensConfig;
use crate::pipeline::{derive_features, predict, Predictor};
use crate::schema::MeasurementInputAdapter;
use crate::types::{LengthUnit, MeasurementRecord, FEATURE_COUNT, MEASUREMENT_COUNT};

/// Number of doubles written by `ratio_lens_predict_raw`
pub const RAW_OUTPUT_LEN: usize = FEATURE_COUNT + 2;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

// ============================================================================
// Predictor API
// ============================================================================

/// Opaque handle to a Predictor
pub struct PredictorHandle {
    predictor: Predictor,
}

/// Create a predictor.
///
/// `config_json` may be NULL for the defaults. `model_path`, when not NULL,
/// overrides the config's model path.
///
/// # Safety
/// - Non-NULL arguments must be valid null-terminated C strings.
/// - Must be freed with `ratio_lens_predictor_free`.
/// - Returns NULL if the config is invalid or the model cannot be loaded.
#[no_mangle]
pub unsafe extern "C" fn ratio_lens_predictor_new(
    model_path: *const c_char,
    config_json: *const c_char,
) -> *mut PredictorHandle {
    clear_last_error();

    let mut config = if config_json.is_null() {
        RatioLensConfig::default()
    } else {
        let json = match cstr_to_string(config_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        };
        match RatioLensConfig::from_json(&json) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    if !model_path.is_null() {
        match cstr_to_string(model_path) {
            Some(path) => config.model_path = PathBuf::from(path),
            None => {
                set_last_error("Invalid model_path string pointer");
                return ptr::null_mut();
            }
        }
    }

    match Predictor::from_config(config) {
        Ok(predictor) => Box::into_raw(Box::new(PredictorHandle { predictor })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a predictor.
///
/// # Safety
/// - `predictor` must be a pointer returned by `ratio_lens_predictor_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn ratio_lens_predictor_free(predictor: *mut PredictorHandle) {
    if !predictor.is_null() {
        drop(Box::from_raw(predictor));
    }
}

/// Predict from a measurement JSON record and return the payload JSON.
///
/// # Safety
/// - `predictor` must be a valid pointer returned by `ratio_lens_predictor_new`.
/// - `json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `ratio_lens_free_string`.
/// - Returns NULL on error; call `ratio_lens_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn ratio_lens_predict(
    predictor: *const PredictorHandle,
    json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if predictor.is_null() {
        set_last_error("Null predictor pointer");
        return ptr::null_mut();
    }
    let handle = &*predictor;

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    match handle.predictor.predict_json(&json_str) {
        Ok(payload) => string_to_cstr(&payload),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Predict from twelve raw measurements in millimetres, in the order
/// stature, biacromialbreadth, chestcircumference, buttockcircumference,
/// waistcircumference, hipbreadth, forearmcircumferenceflexed,
/// wristcircumference, calfcircumference, anklecircumference, footlength,
/// forearmhandlength.
///
/// Writes `RAW_OUTPUT_LEN` doubles to `out`: probability of female, the
/// eleven attributions in column order, then the baseline.
///
/// # Safety
/// - `predictor` must be a valid pointer returned by `ratio_lens_predictor_new`.
/// - `measurements` must point to `measurements_len` readable doubles.
/// - `out` must point to `out_len` writable doubles.
/// - Returns 0 on success, -1 on error; call `ratio_lens_last_error` for the message.
#[no_mangle]
pub unsafe extern "C" fn ratio_lens_predict_raw(
    predictor: *const PredictorHandle,
    measurements: *const f64,
    measurements_len: usize,
    out: *mut f64,
    out_len: usize,
) -> c_int {
    clear_last_error();

    if predictor.is_null() || measurements.is_null() || out.is_null() {
        set_last_error("Null pointer argument");
        return -1;
    }
    if measurements_len != MEASUREMENT_COUNT {
        set_last_error(&format!(
            "expected {} measurements, got {}",
            MEASUREMENT_COUNT, measurements_len
        ));
        return -1;
    }
    if out_len < RAW_OUTPUT_LEN {
        set_last_error(&format!(
            "output buffer needs {} doubles, got {}",
            RAW_OUTPUT_LEN, out_len
        ));
        return -1;
    }

    let handle = &*predictor;
    let mut values = [0.0; MEASUREMENT_COUNT];
    values.copy_from_slice(std::slice::from_raw_parts(measurements, measurements_len));

    match predict(handle.predictor.engine(), MeasurementRecord::new(values)) {
        Ok(prediction) => {
            let out = std::slice::from_raw_parts_mut(out, RAW_OUTPUT_LEN);
            out[0] = prediction.probability_female;
            out[1..=FEATURE_COUNT].copy_from_slice(&prediction.attributions);
            out[FEATURE_COUNT + 1] = prediction.baseline;
            0
        }
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Derive the eleven model features from a measurement JSON record.
///
/// `unit` may be NULL, in which case records without a unit are read as mm.
///
/// # Safety
/// - `json` must be a valid null-terminated C string; `unit` likewise or NULL.
/// - Returns a newly allocated string that must be freed with `ratio_lens_free_string`.
/// - Returns NULL on error; call `ratio_lens_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn ratio_lens_derive(
    json: *const c_char,
    unit: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    let default_unit = if unit.is_null() {
        LengthUnit::Mm
    } else {
        match cstr_to_string(unit).map(|u| LengthUnit::parse(&u)) {
            Some(Ok(unit)) => unit,
            Some(Err(e)) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
            None => {
                set_last_error("Invalid unit string pointer");
                return ptr::null_mut();
            }
        }
    };

    let result = MeasurementInputAdapter::parse_one(&json_str)
        .and_then(|input| derive_features(&input, default_unit, false))
        .and_then(|(_, features)| Ok(serde_json::to_string(&features)?));

    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a string returned by ratio-lens functions.
///
/// # Safety
/// - `ptr` must be a pointer returned by a ratio-lens function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn ratio_lens_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next ratio-lens call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn ratio_lens_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn ratio_lens_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

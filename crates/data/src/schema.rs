//! Generated-by-hand equivalent of `diesel print-schema` for the single
//! `room` table this crate writes to.

diesel::table! {
    room (time, id) {
        time -> Timestamptz,
        id -> Text,
        name -> Text,
        temperature -> Nullable<Double>,
        temperature_target -> Nullable<Double>,
        humidity -> Nullable<Double>,
        light -> Nullable<Bool>,
        shading -> Nullable<Double>,
        valve -> Nullable<Double>,
        ventilation -> Nullable<Bool>,
        presence -> Nullable<Bool>,
    }
}

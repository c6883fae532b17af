// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Builds libcallback.so. Every exported routine takes no arguments and
// returns nothing; its symbol name is the callback name a registrar sends.
//
//   cargo build -p callback_unit && cp target/debug/libcallback.so .

#[no_mangle]
pub extern "C" fn my_callback_function() {
    println!("Callback function executed!");
}

#[no_mangle]
pub extern "C" fn another_callback() {
    println!("Another callback executed (pid {})", std::process::id());
}

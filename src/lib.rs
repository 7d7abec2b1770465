// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Line-protocol bridge to a Bluetooth LE GATT peer.
//!
//! Commands arrive one per line on stdin; every response is a single
//! `rsp=$...` line on stdout. Notifications and indications from the peer
//! are interleaved with command responses as they arrive.

pub mod app;
pub mod bluetooth;
pub mod commands;
pub mod config;
pub mod connection;
pub mod events;
pub mod wire;

//! Escalation Scheduler Library
//!
//! Periodic jobs that scan booking and driver state for stuck or
//! expiring conditions and emit admin notifications exactly once per
//! threshold crossing:
//! - Pending driver acceptance (every 10 minutes)
//! - Late pickup milestones (every 30 minutes)
//! - Document expiry (daily)
//! - Tariff price-change apply/revert (daily)
// Copyright 2025 Francisco F. Pinochet
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


pub mod jobs;
pub mod scheduler;
pub mod store;

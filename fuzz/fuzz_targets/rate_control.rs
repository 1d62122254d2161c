// Copyright (c) 2023 The TQUIC Authors.
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

#![no_main]

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use lazy_static::lazy_static;
use libfuzzer_sys::fuzz_target;

use vcp::ControlLaw;
use vcp::FeedbackField;
use vcp::LoadCode;
use vcp::PacketMeta;
use vcp::SenderConfig;
use vcp::SenderFlow;
use vcp::VcpTables;

lazy_static! {
    static ref TABLES: Arc<VcpTables> = VcpTables::shared();
}

// Every two bytes drive one step: the first picks the feedback, the second
// the time advance in milliseconds.
fuzz_target!(|data: &[u8]| {
    let raw = data.first().map_or(false, |b| b & 1 == 1);
    let mut conf = SenderConfig::new();
    if raw {
        conf.set_control_law(ControlLaw::Raw);
    }
    let mut flow = SenderFlow::new(1, &conf, TABLES.clone()).unwrap();

    let mut now = Instant::now();
    let mut sent = flow.send_much(now);
    for step in data.chunks_exact(2) {
        now += Duration::from_millis(step[1] as u64);
        sent.extend(flow.on_timeout(now).unwrap());

        if sent.is_empty() {
            continue;
        }
        let data = sent.remove(0);
        let feedback = if raw {
            FeedbackField::raw(step[0] as f64)
        } else {
            match step[0] % 3 {
                0 => FeedbackField::coded(LoadCode::Low),
                1 => FeedbackField::coded(LoadCode::High),
                _ => FeedbackField::coded(LoadCode::Over),
            }
        };
        let ack = PacketMeta::ack(1, data.seq + 1, 40, now, data.timestamp)
            .with_feedback(feedback);
        sent.extend(flow.on_ack(&ack, now).unwrap());

        let cwnd = flow.controller().congestion_window();
        assert!(cwnd >= 1.0 && cwnd.is_finite());
    }
});

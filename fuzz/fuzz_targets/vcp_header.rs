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

use libfuzzer_sys::fuzz_target;

use vcp::packet::VcpHeader;
use vcp::packet::VCP_HEADER_LEN;

fuzz_target!(|data: &[u8]| {
    let (hdr, len) = match VcpHeader::from_bytes(data) {
        Ok(v) => v,
        Err(_) => return,
    };
    assert_eq!(len, VCP_HEADER_LEN);

    let mut buf = [0; VCP_HEADER_LEN];
    let written = hdr.to_bytes(&mut buf).unwrap();
    assert_eq!(written, VCP_HEADER_LEN);

    let (decoded, _) = VcpHeader::from_bytes(&buf).unwrap();
    assert_eq!(decoded, hdr);
});

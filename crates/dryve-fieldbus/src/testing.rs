//! In-process fake drive for unit tests.

use crate::od::{find_by_address, ObjectKey};
use crate::telegram::{self, EXCEPTION_FLAG, FUNCTION_CODE, PDU_HEADER_LEN};
use crate::transport::RequestChannel;
use dryve_common::error::DryveResult;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct State {
    store: HashMap<ObjectKey, Vec<u8>>,
    requests: Vec<Vec<u8>>,
    statusword_script: VecDeque<u16>,
    transitions: HashMap<u16, u16>,
    exceptions: (u32, u8),
    corrupt_tid: bool,
    transaction_id: u16,
}

/// Answers telegrams from an in-memory object store.
#[derive(Default)]
pub(crate) struct FakeDrive {
    state: Mutex<State>,
}

impl FakeDrive {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn set(&self, key: ObjectKey, bytes: &[u8]) {
        self.state.lock().unwrap().store.insert(key, bytes.to_vec());
    }

    pub(crate) fn get(&self, key: ObjectKey) -> Vec<u8> {
        let state = self.state.lock().unwrap();
        state
            .store
            .get(&key)
            .cloned()
            .unwrap_or_else(|| vec![0; usize::from(key.entry().length)])
    }

    pub(crate) fn set_statusword(&self, statusword: u16) {
        self.set(ObjectKey::Statusword, &statusword.to_le_bytes());
    }

    /// Statusword reads return these values in order; the last one sticks.
    pub(crate) fn script_statusword(&self, values: &[u16]) {
        self.state
            .lock()
            .unwrap()
            .statusword_script
            .extend(values.iter().copied());
    }

    /// Writing `controlword` makes the Statusword read `statusword`.
    pub(crate) fn on_controlword(&self, controlword: u16, statusword: u16) {
        self.state
            .lock()
            .unwrap()
            .transitions
            .insert(controlword, statusword);
    }

    pub(crate) fn fail_next(&self, count: u32, code: u8) {
        self.state.lock().unwrap().exceptions = (count, code);
    }

    pub(crate) fn corrupt_next_transaction_id(&self) {
        self.state.lock().unwrap().corrupt_tid = true;
    }

    pub(crate) fn request_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    pub(crate) fn last_request(&self) -> Option<Vec<u8>> {
        self.state.lock().unwrap().requests.last().cloned()
    }

    pub(crate) fn written_controlwords(&self) -> Vec<u16> {
        let state = self.state.lock().unwrap();
        state
            .requests
            .iter()
            .filter(|pdu| pdu[2] == 1 && pdu[6..8] == [0x60, 0x40])
            .map(|pdu| u16::from_le_bytes([pdu[13], pdu[14]]))
            .collect()
    }

    fn respond(state: &mut State, pdu: &[u8]) -> Vec<u8> {
        if state.exceptions.0 > 0 {
            state.exceptions.0 -= 1;
            return vec![FUNCTION_CODE | EXCEPTION_FLAG, state.exceptions.1];
        }

        let index = u16::from_be_bytes([pdu[6], pdu[7]]);
        let Ok(key) = find_by_address(index, pdu[8]) else {
            return vec![FUNCTION_CODE | EXCEPTION_FLAG, 0x02];
        };

        if pdu[2] == 1 {
            let data = pdu[PDU_HEADER_LEN..].to_vec();
            if key == ObjectKey::Controlword {
                let controlword = u16::from_le_bytes([data[0], data[1]]);
                if let Some(statusword) = state.transitions.get(&controlword).copied() {
                    state
                        .store
                        .insert(ObjectKey::Statusword, statusword.to_le_bytes().to_vec());
                }
            }
            state.store.insert(key, data);
            return pdu.to_vec();
        }

        if key == ObjectKey::Statusword {
            if let Some(next) = state.statusword_script.pop_front() {
                state
                    .store
                    .insert(ObjectKey::Statusword, next.to_le_bytes().to_vec());
            }
        }
        let data = state
            .store
            .get(&key)
            .cloned()
            .unwrap_or_else(|| vec![0; usize::from(key.entry().length)]);

        let mut response = pdu[..PDU_HEADER_LEN].to_vec();
        response[12] = data.len() as u8;
        response.extend_from_slice(&data);
        response
    }
}

impl RequestChannel for FakeDrive {
    fn send_request(&self, pdu: &[u8]) -> DryveResult<(u16, Vec<u8>)> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(pdu.to_vec());
        state.transaction_id = state.transaction_id.wrapping_add(1);
        let transaction_id = state.transaction_id;

        let response = Self::respond(&mut state, pdu);
        let echoed = if std::mem::take(&mut state.corrupt_tid) {
            transaction_id.wrapping_add(100)
        } else {
            transaction_id
        };
        Ok((transaction_id, telegram::frame_request(echoed, 0, &response)?))
    }
}

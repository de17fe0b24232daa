use crate::models::message_type::{CommandMapping, MessageType};

use super::header::{MessageHeader, HEADER_SIZE};

/// Frame an outbound message: header followed by payload.
pub fn encode_frame(message_type: MessageType, payload: &[u8]) -> Vec<u8> {
    encode_raw(message_type.id(), payload)
}

/// Frame a payload under an arbitrary type id.
pub fn encode_raw(type_id: u32, payload: &[u8]) -> Vec<u8> {
    let header = MessageHeader {
        length: payload.len() as u32,
        type_id,
    };
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(payload);
    frame
}

pub fn encode_command(command: CommandMapping) -> Vec<u8> {
    encode_frame(MessageType::Command, &command.id().to_le_bytes())
}

pub fn encode_heartbeat() -> Vec<u8> {
    encode_frame(MessageType::HeartBeat, &[])
}

/// Microphone uplink frame: AUDIO_DATA sub-header then PCM.
pub fn encode_mic_audio(decode_type: u32, audio_type: u32, pcm: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(12 + pcm.len());
    payload.extend_from_slice(&decode_type.to_le_bytes());
    payload.extend_from_slice(&0f32.to_le_bytes());
    payload.extend_from_slice(&audio_type.to_le_bytes());
    payload.extend_from_slice(pcm);
    encode_frame(MessageType::AudioData, &payload)
}

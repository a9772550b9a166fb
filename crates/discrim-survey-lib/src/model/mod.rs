pub mod speaker_turn;
pub mod utterance;

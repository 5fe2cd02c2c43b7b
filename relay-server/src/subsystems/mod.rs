pub mod autopilot;
pub mod conversation;
pub mod events;
pub mod gateway;
pub mod inbound;
pub mod learner;
pub mod responder;
pub mod tenant;
pub mod trainer;
pub mod voice;

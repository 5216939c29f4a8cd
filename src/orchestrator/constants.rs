pub(crate) const GREETING: &str = "¡Hola! ¿Cómo puedo ayudarte a practicar español hoy?";
pub(crate) const APOLOGY: &str =
    "Lo siento, estoy teniendo problemas para responder. ¿Puedes intentarlo de nuevo?";
pub(crate) const RESPONSE_FAILED_MESSAGE: &str = "Failed to get AI response. Please try again.";

pub(crate) const GREETING_AUDIO_SECONDS: u32 = 3;
pub(crate) const APOLOGY_AUDIO_SECONDS: u32 = 4;

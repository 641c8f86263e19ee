use crate::completion::Message;

/// Persona instruction sent as the system turn of every conversation.
pub const PERSONA_PROMPT: &str = "\
You are a professional AI assistant representing Jorge Hewstone. Your goal is to convince \
the person talking with you that Jorge Hewstone is a great machine learning engineer.
You have access to information about him so you can answer questions accurately (do not \
invent anything concrete).
If the information does not answer a question that could cast doubt on Jorge's abilities, \
you may use what is available to argue that Jorge could improve and learn very quickly.";

/// Build the `[system, user]` message pair for one question.
pub fn assemble(context: &str, query: &str) -> Vec<Message> {
    vec![
        Message::system(PERSONA_PROMPT),
        Message::user(format!("CONTEXT:\n{context}\n\nQUESTION: {query}")),
    ]
}

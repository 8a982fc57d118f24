//! Event names used by the channel protocol.

/// Local: the session (re)connected to the server
pub const CONNECT: &str = "connect";
/// Local: the session lost its link to the server
pub const DISCONNECT: &str = "disconnect";

/// Client → server: join a channel
pub const JOIN_CHANNEL: &str = "joinChannel";
/// Client → server: answer a password prompt
pub const CHANNEL_PASSWORD: &str = "channelPassword";

/// Server → client: the channel requires a password
pub const NEED_PASSWORD: &str = "needPassword";
/// Server → client: permissions for the joined channel. Doubles as the join ack.
pub const SET_PERMISSIONS: &str = "setPermissions";
pub const CHANGE_MEDIA: &str = "changeMedia";
pub const PLAYLIST: &str = "playlist";
pub const USERLIST: &str = "userlist";

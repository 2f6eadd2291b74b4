pub mod ffmpeg_video_inspector;
pub mod frame_io;
pub mod media_type;
pub mod temp_workspace;

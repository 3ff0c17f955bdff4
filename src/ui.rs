use iocraft::prelude::*;
use tokio::sync::watch;

/// Reactive upload state: whether a transfer is in flight and how far along
/// it is, 0..=100. Published over a watch channel so any frontend can
/// subscribe.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UploadState {
    pub uploading: bool,
    pub progress: f32,
}

#[derive(Default, Props)]
pub struct ProgressBarProps {
    pub title: String,
    pub progress: Option<watch::Receiver<UploadState>>,
}

#[component]
pub fn ProgressBar(props: &ProgressBarProps, mut hooks: Hooks) -> impl Into<AnyElement<'static>> {
    let mut state = hooks.use_state(UploadState::default);
    let receiver = props.progress.clone();

    hooks.use_future(async move {
        if let Some(mut receiver) = receiver {
            loop {
                if receiver.changed().await.is_err() {
                    break;
                }
                let value = *receiver.borrow();
                state.set(value);
            }
        }
    });

    element! {
        View(flex_direction: FlexDirection::Column) {
            Text(weight: Weight::Bold, content: props.title.clone())
            View(flex_direction: FlexDirection::Row) {
                View(border_style: BorderStyle::Round, border_color: Color::Blue, width: 60) {
                    View(width: Percent(state.get().progress), height: 1, background_color: Color::Green)
                }
                View(padding: 1) {
                    Text(content: format!("{:.0}%", state.get().progress))
                }
            }
        }
    }
}

#[derive(Default, Props)]
pub struct ErrorMessageProps {
    pub message: String,
}

#[component]
pub fn ErrorMessage(props: &ErrorMessageProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(border_style: BorderStyle::Round, border_color: Color::Red, padding: 1) {
            Text(color: Color::Red, content: format!("✗ {}", props.message))
        }
    }
}

#[derive(Default, Props)]
pub struct SuccessMessageProps {
    pub message: String,
}

#[component]
pub fn SuccessMessage(props: &SuccessMessageProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(border_style: BorderStyle::Round, border_color: Color::Green, padding: 1) {
            Text(color: Color::Green, content: format!("✓ {}", props.message))
        }
    }
}

#[derive(Default, Props)]
pub struct InputPromptProps {
    pub prompt: String,
    pub default: Option<String>,
    pub description: Option<String>,
}

#[component]
pub fn InputPrompt(props: &InputPromptProps) -> impl Into<AnyElement<'static>> {
    element! {
        View(flex_direction: FlexDirection::Column) {
            Text(weight: Weight::Bold, content: props.prompt.clone())
            #(props.description.clone().map(|description| element! {
                Text(color: Color::DarkGrey, content: description)
            }))
            #(props.default.clone().map(|default| element! {
                Text(color: Color::DarkGrey, content: format!("(default: {})", default))
            }))
        }
    }
}

#[component]
pub fn ConfigHeader() -> impl Into<AnyElement<'static>> {
    element! {
        View(border_style: BorderStyle::Round, border_color: Color::Blue, padding: 1) {
            Text(weight: Weight::Bold, content: "uplift configuration")
        }
    }
}

pub mod step_1_dataset_preparation;
pub mod step_2_decision_tree;
pub mod step_3_random_forest;
pub mod step_4_hyperparameter_tuning;
pub mod step_5_train_and_evaluate;
